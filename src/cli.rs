//! Command-line interface definitions for Blog Relay.
//!
//! Every option can also come from the environment; the API credentials
//! usually do.

use clap::Parser;

use crate::feed::MarkPolicy;
use crate::quota::DEFAULT_MONTHLY_LIMIT;
use crate::store::DEFAULT_TABLE;

/// Command-line arguments for the Blog Relay application.
///
/// # Examples
///
/// ```sh
/// # Poll the feed and process new posts in the default category
/// DEEPL_API_KEY=... SUPABASE_URL=... SUPABASE_KEY=... blog_relay
///
/// # Process one post without touching the feed
/// blog_relay --post-url https://blog.naver.com/dev-dev/223866688653
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// RSS feed of the source blog
    #[arg(long, env = "FEED_URL", default_value = "https://rss.blog.naver.com/dev-dev.xml")]
    pub feed_url: String,

    /// Only posts with a category containing this text are processed
    #[arg(long, default_value = "맛집일기_얌얌")]
    pub category: String,

    /// Process this single post instead of polling the feed
    #[arg(long)]
    pub post_url: Option<String>,

    /// Directory receiving the kor/ and eng/ documents
    #[arg(short, long, default_value = ".")]
    pub output_dir: String,

    /// Directory holding processed_posts.json and translation_counter.txt
    #[arg(short, long, default_value = ".")]
    pub state_dir: String,

    /// DeepL authentication key (":fx" keys use the free endpoint)
    #[arg(long, env = "DEEPL_API_KEY")]
    pub deepl_api_key: String,

    /// Perplexity API key; without it posts get no itinerary section
    #[arg(long, env = "PPLX_API_KEY")]
    pub pplx_api_key: Option<String>,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase service key
    #[arg(long, env = "SUPABASE_KEY")]
    pub supabase_key: Option<String>,

    /// Table receiving published posts
    #[arg(long, default_value = DEFAULT_TABLE)]
    pub supabase_table: String,

    /// Monthly translation character allowance
    #[arg(long, default_value_t = DEFAULT_MONTHLY_LIMIT)]
    pub monthly_char_limit: u64,

    /// Text appended to each title before it is translated
    #[arg(long, default_value = "korea hongdae")]
    pub title_hint: String,

    /// Mark posts processed only once their files are written
    #[arg(long)]
    pub mark_on_success: bool,

    /// Timeout for feed, page, translation, and store requests
    #[arg(long, default_value_t = 60)]
    pub http_timeout_secs: u64,
}

impl Cli {
    pub fn mark_policy(&self) -> MarkPolicy {
        if self.mark_on_success {
            MarkPolicy::OnSuccess
        } else {
            MarkPolicy::OnDiscovery
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["blog_relay", "--deepl-api-key", "abc:fx"]);

        assert_eq!(cli.deepl_api_key, "abc:fx");
        assert_eq!(cli.category, "맛집일기_얌얌");
        assert_eq!(cli.output_dir, ".");
        assert_eq!(cli.state_dir, ".");
        assert_eq!(cli.supabase_table, "engPost");
        assert_eq!(cli.monthly_char_limit, 493_989);
        assert_eq!(cli.title_hint, "korea hongdae");
        assert_eq!(cli.http_timeout_secs, 60);
        assert_eq!(cli.post_url, None);
        assert_eq!(cli.mark_policy(), MarkPolicy::OnDiscovery);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "blog_relay",
            "--deepl-api-key",
            "k",
            "-o",
            "/tmp/out",
            "-s",
            "/tmp/state",
            "--mark-on-success",
            "--post-url",
            "https://blog.naver.com/dev-dev/1",
        ]);

        assert_eq!(cli.output_dir, "/tmp/out");
        assert_eq!(cli.state_dir, "/tmp/state");
        assert_eq!(cli.mark_policy(), MarkPolicy::OnSuccess);
        assert_eq!(cli.post_url.as_deref(), Some("https://blog.naver.com/dev-dev/1"));
    }
}
