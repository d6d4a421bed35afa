//! RSS polling and the processed-post set.
//!
//! The watcher keeps only entries whose category contains the configured
//! category string and whose URL has not been handled before. Which URLs
//! count as handled is persisted as a JSON array through a [`StateStore`].
//!
//! With [`MarkPolicy::OnDiscovery`] new URLs are marked as soon as they are
//! returned, so a crash before the post is written skips it for good.
//! [`MarkPolicy::OnSuccess`] leaves marking to the pipeline.

use feed_rs::parser;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::models::FeedItem;
use crate::state::{StateError, StateStore};
use crate::utils::take_chars;

/// Characters of the description kept as the item summary.
const SUMMARY_CHARS: usize = 100;

static IMG_SRC: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    State(#[from] StateError),
}

/// When newly discovered URLs enter the processed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkPolicy {
    /// As soon as the watcher returns them.
    #[default]
    OnDiscovery,
    /// Only once the pipeline has written the post.
    OnSuccess,
}

/// Supplies the raw feed document.
pub trait FeedSource {
    async fn fetch(&self) -> Result<String, FeedError>;
}

/// Fetches the feed over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    /// A source that GETs `url` with the shared `client`.
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

impl FeedSource for HttpFeedSource {
    #[instrument(level = "info", skip_all, fields(url = %self.url))]
    async fn fetch(&self) -> Result<String, FeedError> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(bytes = body.len(), "Fetched feed");
        Ok(body)
    }
}

/// URLs that have already been handled.
///
/// The set only grows. History that could not be read is never written
/// over: unparsable contents are quarantined before the set starts empty,
/// and a set whose file could not be read at all refuses to save.
#[derive(Debug)]
pub struct ProcessedSet<S> {
    store: S,
    urls: BTreeSet<String>,
    writable: bool,
}

impl<S: StateStore> ProcessedSet<S> {
    /// Load the set from `store`.
    ///
    /// # Arguments
    ///
    /// * `store` - Where the JSON array of URLs lives
    ///
    /// # Returns
    ///
    /// The loaded set. Missing state loads as empty. Malformed state is
    /// moved aside with [`StateStore::quarantine`] and loads as empty.
    /// State that cannot be read loads as empty and read-only, so every
    /// later [`extend_and_save`](Self::extend_and_save) fails instead of
    /// replacing it.
    pub fn load(store: S) -> Self {
        let (urls, writable) = match store.load() {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(urls) => (urls.into_iter().collect(), true),
                Err(e) => {
                    warn!(error = %e, "Corrupt processed-post file; starting empty");
                    match store.quarantine() {
                        Ok(()) => (BTreeSet::new(), true),
                        Err(qe) => {
                            error!(error = %qe, "Could not move corrupt processed-post file aside");
                            (BTreeSet::new(), false)
                        }
                    }
                }
            },
            Ok(None) => (BTreeSet::new(), true),
            Err(e) => {
                warn!(error = %e, "Could not read processed-post file; starting empty");
                (BTreeSet::new(), false)
            }
        };
        debug!(count = urls.len(), writable, "Loaded processed posts");
        Self {
            store,
            urls,
            writable,
        }
    }

    /// Whether `url` has been handled.
    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Number of handled URLs.
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// True before anything has been handled.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Add `urls` and persist the union as a sorted, pretty JSON array.
    ///
    /// # Errors
    ///
    /// [`StateError::Unreadable`] when the set was loaded from state that
    /// could not be read; nothing is written. Serialization and I/O
    /// failures are returned as-is. The in-memory set keeps the new URLs
    /// either way, so the current run still skips them.
    pub fn extend_and_save<I, U>(&mut self, urls: I) -> Result<(), StateError>
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        self.urls.extend(urls.into_iter().map(Into::into));
        if !self.writable {
            return Err(StateError::Unreadable);
        }
        let json = serde_json::to_string_pretty(&self.urls)?;
        self.store.save(&json)
    }
}

/// Parse a feed document into items, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, FeedError> {
    let feed = parser::parse(xml.as_bytes()).map_err(|e| FeedError::Parse(e.to_string()))?;

    let mut items = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let url = match entry.links.first() {
            Some(link) => link.href.clone(),
            None if entry.id.starts_with("http") => entry.id.clone(),
            None => {
                warn!(id = %entry.id, "Feed entry without a link; skipping");
                continue;
            }
        };
        let description = entry.summary.map(|s| s.content);
        items.push(FeedItem {
            url,
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            tags: entry.categories.into_iter().map(|c| c.term).collect(),
            published: entry.published,
            lead_image_url: description.as_deref().and_then(first_image_src),
            summary: description.as_deref().map(summarize),
        });
    }
    Ok(items)
}

/// `src` of the first image in an HTML snippet.
pub fn first_image_src(html: &str) -> Option<String> {
    Html::parse_fragment(html)
        .select(&IMG_SRC)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|src| src.trim().to_string())
        .filter(|src| !src.is_empty())
}

fn summarize(html: &str) -> String {
    let text = Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<String>();
    format!("{}...", take_chars(text.trim(), SUMMARY_CHARS))
}

/// Polls the feed and tracks what has been handled.
#[derive(Debug)]
pub struct FeedWatcher<F, S> {
    source: F,
    processed: ProcessedSet<S>,
    policy: MarkPolicy,
}

impl<F: FeedSource, S: StateStore> FeedWatcher<F, S> {
    /// A watcher over `source` that remembers URLs in `processed`.
    pub fn new(source: F, processed: ProcessedSet<S>, policy: MarkPolicy) -> Self {
        Self {
            source,
            processed,
            policy,
        }
    }

    /// When discovered URLs are recorded.
    pub fn policy(&self) -> MarkPolicy {
        self.policy
    }

    /// URLs handled so far, including this run's.
    pub fn processed(&self) -> &ProcessedSet<S> {
        &self.processed
    }

    /// Fetches the feed and returns the items not handled yet.
    ///
    /// Items are kept when any of their categories contains `category`,
    /// their URL is not in the processed set, and no earlier item in the
    /// same document had the same URL. Under [`MarkPolicy::OnDiscovery`] the
    /// returned URLs are saved before this returns.
    ///
    /// # Arguments
    ///
    /// * `category` - Substring matched against each item's categories
    ///
    /// # Returns
    ///
    /// The new items in feed order, possibly empty.
    ///
    /// # Errors
    ///
    /// Fails when the feed cannot be fetched or parsed, or when saving the
    /// processed set fails. Nothing is saved when the fetch or parse fails.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let items = watcher.poll_new_items("맛집일기_얌얌").await?;
    /// for item in &items {
    ///     println!("{}", item.url);
    /// }
    /// ```
    #[instrument(level = "info", skip(self))]
    pub async fn poll_new_items(&mut self, category: &str) -> Result<Vec<FeedItem>, FeedError> {
        let xml = self.source.fetch().await?;
        let items = parse_feed(&xml)?;
        info!(entries = items.len(), "Parsed feed");

        let mut seen_now = BTreeSet::new();
        let new_items: Vec<FeedItem> = items
            .into_iter()
            .filter(|item| item.tags.iter().any(|tag| tag.contains(category)))
            .filter(|item| !self.processed.contains(&item.url))
            .filter(|item| seen_now.insert(item.url.clone()))
            .collect();

        for item in &new_items {
            info!(
                title = %item.title,
                url = %item.url,
                published = ?item.published,
                summary = item.summary.as_deref().unwrap_or_default(),
                "New post found"
            );
        }

        if new_items.is_empty() {
            info!("No new posts");
        } else if self.policy == MarkPolicy::OnDiscovery {
            self.processed
                .extend_and_save(new_items.iter().map(|item| item.url.clone()))?;
            info!(count = new_items.len(), "Marked new posts as processed");
        }

        Ok(new_items)
    }

    /// Record a successfully written post.
    pub fn mark_processed(&mut self, url: &str) -> Result<(), StateError> {
        if self.processed.contains(url) {
            return Ok(());
        }
        self.processed.extend_and_save([url])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::state::{FileStore, MemoryStore, UnreadableStore};
    use tempfile::TempDir;

    pub(crate) const CATEGORY: &str = "맛집일기_얌얌";

    /// Serves a fixed document.
    #[derive(Debug)]
    pub(crate) struct StaticFeed(pub String);

    impl FeedSource for StaticFeed {
        async fn fetch(&self) -> Result<String, FeedError> {
            Ok(self.0.clone())
        }
    }

    pub(crate) fn sample_rss() -> String {
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>dev-dev 블로그</title>
    <link>https://blog.naver.com/dev-dev</link>
    <description>맛집 기록</description>
    <item>
      <title>[연남] 토마토 파스타</title>
      <link>https://blog.naver.com/dev-dev/1001</link>
      <guid>https://blog.naver.com/dev-dev/1001</guid>
      <category>맛집일기_얌얌</category>
      <description><![CDATA[<img src="https://blogthumb.pstatic.net/1001.jpg"> 연남동에 있는 파스타 집]]></description>
      <pubDate>Mon, 02 Jun 2025 12:00:00 +0900</pubDate>
    </item>
    <item>
      <title>개발 일지</title>
      <link>https://blog.naver.com/dev-dev/1002</link>
      <guid>https://blog.naver.com/dev-dev/1002</guid>
      <category>개발</category>
      <description>코드</description>
      <pubDate>Mon, 02 Jun 2025 11:00:00 +0900</pubDate>
    </item>
    <item>
      <title>[합정] 라멘</title>
      <link>https://blog.naver.com/dev-dev/1003</link>
      <guid>https://blog.naver.com/dev-dev/1003</guid>
      <category>2025 맛집일기_얌얌 모음</category>
      <description>텍스트만</description>
      <pubDate>Sun, 01 Jun 2025 12:00:00 +0900</pubDate>
    </item>
  </channel>
</rss>"#
            .to_string()
    }

    #[test]
    fn test_parse_feed_items() {
        let items = parse_feed(&sample_rss()).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].url, "https://blog.naver.com/dev-dev/1001");
        assert_eq!(items[0].title, "[연남] 토마토 파스타");
        assert_eq!(items[0].tags, vec!["맛집일기_얌얌".to_string()]);
        assert_eq!(
            items[0].lead_image_url.as_deref(),
            Some("https://blogthumb.pstatic.net/1001.jpg")
        );
        assert!(items[0].published.is_some());
        assert_eq!(items[1].lead_image_url, None);
        assert_eq!(items[1].summary.as_deref(), Some("코드..."));
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        assert!(matches!(parse_feed("not xml"), Err(FeedError::Parse(_))));
    }

    #[test]
    fn test_processed_set_tolerates_corruption() {
        let store = MemoryStore::with_contents("{oops");
        let set = ProcessedSet::load(&store);
        assert!(set.is_empty());
        assert_eq!(store.quarantined().as_deref(), Some("{oops"));
    }

    #[tokio::test]
    async fn test_truncated_history_is_kept_aside_after_next_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed_posts.json");
        let full = serde_json::to_string_pretty(&[
            "https://blog.naver.com/dev-dev/900",
            "https://blog.naver.com/dev-dev/901",
            "https://blog.naver.com/dev-dev/902",
        ])
        .unwrap();
        let truncated = &full[..full.len() / 2];
        std::fs::write(&path, truncated).unwrap();

        let store = FileStore::new(path.clone());
        let processed = ProcessedSet::load(&store);
        assert!(processed.is_empty());

        let mut watcher = FeedWatcher::new(StaticFeed(sample_rss()), processed, MarkPolicy::OnDiscovery);
        assert_eq!(watcher.poll_new_items(CATEGORY).await.unwrap().len(), 2);

        assert_eq!(
            std::fs::read_to_string(store.quarantine_path()).unwrap(),
            truncated
        );
        let saved: Vec<String> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            saved,
            vec![
                "https://blog.naver.com/dev-dev/1001".to_string(),
                "https://blog.naver.com/dev-dev/1003".to_string(),
            ]
        );
    }

    #[test]
    fn test_unreadable_history_is_never_overwritten() {
        let store = UnreadableStore::default();
        let mut set = ProcessedSet::load(&store);
        assert!(set.is_empty());

        let result = set.extend_and_save(["https://blog.naver.com/dev-dev/1001"]);
        assert!(matches!(result, Err(StateError::Unreadable)));
        assert!(set.contains("https://blog.naver.com/dev-dev/1001"));
        assert_eq!(*store.saved.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn test_poll_returns_only_new_items_and_persists_union() {
        let store = MemoryStore::with_contents(r#"["https://blog.naver.com/dev-dev/1003"]"#);
        let processed = ProcessedSet::load(&store);
        let mut watcher = FeedWatcher::new(StaticFeed(sample_rss()), processed, MarkPolicy::OnDiscovery);

        let items = watcher.poll_new_items(CATEGORY).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://blog.naver.com/dev-dev/1001");

        let saved: Vec<String> = serde_json::from_str(&store.load().unwrap().unwrap()).unwrap();
        assert_eq!(
            saved,
            vec![
                "https://blog.naver.com/dev-dev/1001".to_string(),
                "https://blog.naver.com/dev-dev/1003".to_string(),
            ]
        );

        let again = watcher.poll_new_items(CATEGORY).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_category_is_substring_match() {
        let mut watcher = FeedWatcher::new(
            StaticFeed(sample_rss()),
            ProcessedSet::load(MemoryStore::new()),
            MarkPolicy::OnDiscovery,
        );
        let urls: Vec<String> = watcher
            .poll_new_items(CATEGORY)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://blog.naver.com/dev-dev/1001".to_string(),
                "https://blog.naver.com/dev-dev/1003".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_on_success_policy_defers_marking() {
        let store = MemoryStore::new();
        let mut watcher = FeedWatcher::new(
            StaticFeed(sample_rss()),
            ProcessedSet::load(&store),
            MarkPolicy::OnSuccess,
        );

        let items = watcher.poll_new_items(CATEGORY).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(store.load().unwrap(), None);

        watcher.mark_processed(&items[0].url).unwrap();
        assert!(watcher.processed().contains(&items[0].url));
        assert_eq!(watcher.poll_new_items(CATEGORY).await.unwrap().len(), 1);
    }
}
