//! # Blog Relay
//!
//! Republishes Korean food-blog posts in English. New posts are discovered
//! through the blog's RSS feed, scraped, translated paragraph by paragraph,
//! enriched with a suggested travel course near the restaurant, written as
//! Korean and English markdown, and inserted into a Supabase table.
//!
//! ## Usage
//!
//! ```sh
//! blog_relay -o ./posts -s ./state
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: poll the feed and keep unseen posts in the category
//! 2. **Rendering**: fetch the post page and its content frame
//! 3. **Extraction**: walk the editor components into a bilingual document
//! 4. **Enrichment**: guess the store and address, ask for a travel course
//! 5. **Output**: write markdown and metadata, then publish the row
//!
//! Posts are handled one at a time. Translated characters are counted
//! against a monthly allowance persisted in the state directory.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod extract;
mod feed;
mod heuristics;
mod itinerary;
mod models;
mod outputs;
mod pipeline;
mod quota;
mod render;
mod state;
mod store;
mod translate;
mod utils;

use cli::Cli;
use feed::{FeedWatcher, HttpFeedSource, ProcessedSet};
use itinerary::{ItineraryEnricher, PerplexityClient};
use models::FeedItem;
use pipeline::{PipelineConfig, PostPipeline};
use quota::QuotaTracker;
use render::HttpRenderer;
use state::FileStore;
use store::SupabaseStore;
use translate::{DeepLClient, Translator};
use utils::ensure_writable_dir;

/// JSON array of post URLs already handled.
const PROCESSED_POSTS_FILE: &str = "processed_posts.json";
/// Characters translated so far, as plain text.
const COUNTER_FILE: &str = "translation_counter.txt";

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("blog_relay starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args.output_dir, ?args.state_dir, ?args.feed_url, "Parsed CLI arguments");

    // Early check: both directories must be writable
    for dir in [&args.output_dir, &args.state_dir] {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "Directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.http_timeout_secs))
        .build()?;

    let store = match SupabaseStore::new(
        client.clone(),
        args.supabase_url.as_deref(),
        args.supabase_key.as_deref(),
        &args.supabase_table,
    ) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Cannot publish without store credentials");
            return Err(e.into());
        }
    };
    info!(endpoint = %store.endpoint(), "Store configured");

    let state_dir = Path::new(&args.state_dir);
    let quota = QuotaTracker::new(FileStore::new(state_dir.join(COUNTER_FILE)));
    info!(
        consumed = quota.consumed(),
        remaining = quota.remaining(args.monthly_char_limit),
        "Translation budget at start"
    );

    let processed = ProcessedSet::load(FileStore::new(state_dir.join(PROCESSED_POSTS_FILE)));
    if processed.is_empty() {
        info!("No processed posts recorded yet");
    } else {
        info!(count = processed.len(), "Loaded processed posts");
    }
    let mut watcher = FeedWatcher::new(
        HttpFeedSource::new(client.clone(), &args.feed_url),
        processed,
        args.mark_policy(),
    );
    debug!(policy = ?watcher.policy(), "Processed-post marking");

    let pipeline = PostPipeline::new(
        HttpRenderer::new(client.clone()),
        Translator::new(DeepLClient::new(client.clone(), &args.deepl_api_key)),
        ItineraryEnricher::new(PerplexityClient::new(client, args.pplx_api_key.clone())),
        store,
        quota,
        PipelineConfig {
            output_dir: args.output_dir.clone(),
            title_hint: args.title_hint.clone(),
            monthly_char_limit: args.monthly_char_limit,
        },
    );

    // ---- Discover posts ----
    let items = match &args.post_url {
        Some(url) => {
            info!(%url, "Processing a single post");
            vec![FeedItem::from_url(url)]
        }
        None => match watcher.poll_new_items(&args.category).await {
            Ok(items) => items,
            Err(e) => {
                error!(feed_url = %args.feed_url, error = %e, "Feed poll failed; nothing to do");
                Vec::new()
            }
        },
    };

    // ---- Process ----
    let summary = pipeline.run(&items, &mut watcher).await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        succeeded = summary.succeeded,
        failed = summary.failed,
        processed_total = watcher.processed().len(),
        "Execution complete"
    );

    Ok(())
}
