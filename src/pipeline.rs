//! Per-post processing and the run loop.
//!
//! A post moves through [`PostStage`]s in order. Anything that fails before
//! the documents are written aborts that post only. A failed publish is
//! logged and the post still counts as processed, since the local files
//! already exist.

use chrono::Utc;
use itertools::Itertools;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::extract::extract_document;
use crate::feed::{FeedSource, FeedWatcher};
use crate::heuristics::{extract_fields, extract_tags};
use crate::itinerary::{GenerateText, ItineraryEnricher};
use crate::models::{FeedItem, PostMeta};
use crate::outputs::{json, markdown};
use crate::quota::{QuotaTracker, chargeable_character_count, estimated_posts};
use crate::render::{RenderError, Renderer};
use crate::state::StateStore;
use crate::store::{PostRow, PostStore};
use crate::translate::{Translate, Translator};

/// Steps a post goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStage {
    Fetched,
    Extracted,
    Enriched,
    Persisted,
    Published,
    Done,
    Failed,
}

impl fmt::Display for PostStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PostStage::Fetched => "fetched",
            PostStage::Extracted => "extracted",
            PostStage::Enriched => "enriched",
            PostStage::Persisted => "persisted",
            PostStage::Published => "published",
            PostStage::Done => "done",
            PostStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not render post: {0}")]
    Render(#[from] RenderError),
    #[error("could not write post files: {0}")]
    Persist(String),
}

impl PipelineError {
    /// The stage the post could not complete.
    pub fn stage(&self) -> PostStage {
        match self {
            PipelineError::Render(_) => PostStage::Fetched,
            PipelineError::Persist(_) => PostStage::Persisted,
        }
    }
}

/// Settings that shape every post of a run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: String,
    /// Appended to the title before it is translated.
    pub title_hint: String,
    pub monthly_char_limit: u64,
}

/// What happened to one post that reached local persistence.
#[derive(Debug, Clone)]
pub struct PostOutcome {
    pub meta: PostMeta,
    /// Characters charged against the translation budget.
    pub chars: u64,
    pub published: bool,
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub published: usize,
    pub publish_failed: usize,
}

/// Turns feed items into local documents and published rows.
pub struct PostPipeline<R, T, G, P, Q> {
    renderer: R,
    translator: Translator<T>,
    enricher: ItineraryEnricher<G>,
    store: P,
    quota: QuotaTracker<Q>,
    config: PipelineConfig,
}

impl<R, T, G, P, Q> PostPipeline<R, T, G, P, Q>
where
    R: Renderer,
    T: Translate,
    G: GenerateText,
    P: PostStore,
    Q: StateStore,
{
    /// Wire the collaborators of a run.
    pub fn new(
        renderer: R,
        translator: Translator<T>,
        enricher: ItineraryEnricher<G>,
        store: P,
        quota: QuotaTracker<Q>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            renderer,
            translator,
            enricher,
            store,
            quota,
            config,
        }
    }

    fn hinted_title(&self, title: &str) -> String {
        let hint = self.config.title_hint.trim();
        if hint.is_empty() {
            title.to_string()
        } else {
            format!("{title} {hint}")
        }
    }

    /// Run one post through every stage.
    ///
    /// The page is rendered, the title and every paragraph translated, the
    /// store and address guessed, and an itinerary appended when one can be
    /// generated. The Korean side is charged against the translation
    /// budget, both documents and the metadata file are written, and the
    /// row is published.
    ///
    /// # Arguments
    ///
    /// * `item` - The feed entry to process
    ///
    /// # Returns
    ///
    /// The written metadata, the characters charged, and whether the row was
    /// published. A failed itinerary, counter update, or publish is logged
    /// and does not fail the post.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Render`] when the page cannot be fetched, and
    /// [`PipelineError::Persist`] when the local files cannot be written.
    /// [`PipelineError::stage`] names where it stopped.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let outcome = pipeline.process(&FeedItem::from_url(url)).await?;
    /// println!("{} ({} chars)", outcome.meta.title, outcome.chars);
    /// ```
    #[instrument(level = "info", skip_all, fields(url = %item.url))]
    pub async fn process(&self, item: &FeedItem) -> Result<PostOutcome, PipelineError> {
        let rendered = self.renderer.render(&item.url).await?;
        debug!(stage = %PostStage::Fetched, title = %rendered.title);

        let title = rendered.title;
        let translated_title = self.translator.translate(&self.hinted_title(&title)).await;
        let extraction =
            extract_document(&title, &translated_title, &rendered.main_html, &self.translator)
                .await;
        let image_count = extraction.images_emitted();
        let mut document = extraction.document;
        debug!(stage = %PostStage::Extracted, fragments = document.len());

        let source_fragments = document.source_markdown();
        let fields = extract_fields(&source_fragments);
        let address = fields.label();
        let tags: Vec<String> = item
            .tags
            .iter()
            .cloned()
            .chain(extract_tags(&title, &source_fragments))
            .unique()
            .collect();
        info!(%address, tags = tags.len(), "Extracted post fields");

        match self
            .enricher
            .enrich(&mut document, &address, &self.translator)
            .await
        {
            Ok(itinerary) => {
                info!(
                    chars = itinerary.source.chars().count(),
                    translated_chars = itinerary.translated.chars().count(),
                    "Added itinerary section"
                );
            }
            Err(e) => warn!(error = %e, "Skipping itinerary section"),
        }
        debug!(stage = %PostStage::Enriched);

        let chars = chargeable_character_count(&document.source_markdown());
        if let Err(e) = self.quota.record(chars) {
            error!(error = %e, "Failed to update translation counter");
        }
        let remaining = self.quota.remaining(self.config.monthly_char_limit);
        info!(
            chars,
            remaining,
            estimated_posts = estimated_posts(remaining, chars),
            "Translation budget"
        );

        let documents =
            markdown::write_documents(&self.config.output_dir, &document, &title, &translated_title)
                .await
                .map_err(|e| PipelineError::Persist(e.to_string()))?;
        let meta = PostMeta {
            title: translated_title.clone(),
            source_title: title,
            translated_title,
            fields,
            address,
            tags,
            kor_url: item.url.clone(),
            image_count,
            image_url: item.lead_image_url.clone(),
            documents,
            processed_at: Utc::now(),
        };
        json::write_meta(&meta, &self.config.output_dir)
            .await
            .map_err(|e| PipelineError::Persist(e.to_string()))?;
        debug!(stage = %PostStage::Persisted, images = image_count);

        let row = PostRow::from_meta(&meta, &markdown::document_body(&document.target_markdown()));
        let published = match self.store.insert(&row).await {
            Ok(_) => {
                debug!(stage = %PostStage::Published);
                true
            }
            Err(e) => {
                warn!(error = %e, "Publish failed; local files kept");
                false
            }
        };
        debug!(stage = %PostStage::Done);

        Ok(PostOutcome {
            meta,
            chars,
            published,
        })
    }

    /// Process `items` one at a time, in order, marking each persisted post
    /// in the watcher's processed set.
    ///
    /// A failing post is logged with the stage it stopped at and the run
    /// moves on to the next one.
    ///
    /// # Arguments
    ///
    /// * `items` - Posts to process, usually from [`FeedWatcher::poll_new_items`]
    /// * `watcher` - Receives [`FeedWatcher::mark_processed`] for each success
    ///
    /// # Returns
    ///
    /// Totals for the run.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let items = watcher.poll_new_items(&category).await?;
    /// let summary = pipeline.run(&items, &mut watcher).await;
    /// info!(succeeded = summary.succeeded, failed = summary.failed);
    /// ```
    #[instrument(level = "info", skip_all, fields(items = items.len()))]
    pub async fn run<F, S>(&self, items: &[FeedItem], watcher: &mut FeedWatcher<F, S>) -> RunSummary
    where
        F: FeedSource,
        S: StateStore,
    {
        let mut summary = RunSummary {
            discovered: items.len(),
            ..RunSummary::default()
        };

        for item in items {
            match self.process(item).await {
                Ok(outcome) => {
                    summary.succeeded += 1;
                    if outcome.published {
                        summary.published += 1;
                    } else {
                        summary.publish_failed += 1;
                    }
                    if let Err(e) = watcher.mark_processed(&item.url) {
                        error!(url = %item.url, error = %e, "Failed to record processed post");
                    }
                    info!(
                        url = %item.url,
                        title = %outcome.meta.title,
                        chars = outcome.chars,
                        published = outcome.published,
                        "Post processed"
                    );
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        url = %item.url,
                        stage = %e.stage(),
                        state = %PostStage::Failed,
                        error = %e,
                        "Post failed"
                    );
                }
            }
        }

        info!(
            discovered = summary.discovered,
            succeeded = summary.succeeded,
            failed = summary.failed,
            published = summary.published,
            publish_failed = summary.publish_failed,
            "Run complete"
        );
        summary
    }
}
