//! Data models shared by the feed, extraction, and publishing stages.
//!
//! - [`FeedItem`]: one post discovered in the RSS feed
//! - [`Fragment`] / [`BilingualDocument`]: the ordered Korean/English content
//! - [`ExtractedFields`]: store name and address guessed from the content
//! - [`PostMeta`]: the sidecar written next to the English markdown

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A post discovered in the source feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// The post URL, also used as its identity in the processed set.
    pub url: String,
    pub title: String,
    /// Category terms attached to the feed entry.
    pub tags: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    /// First image found in the entry's HTML description.
    pub lead_image_url: Option<String>,
    /// Truncated plain description, for logging.
    pub summary: Option<String>,
}

impl FeedItem {
    /// A bare item for a URL processed outside the feed.
    pub fn from_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            tags: Vec::new(),
            published: None,
            lead_image_url: None,
            summary: None,
        }
    }
}

/// One unit of a bilingual document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    /// An image reference. `index` is 1-based within the document.
    Image { url: String, index: usize },
}

impl Fragment {
    /// Render the fragment the way it is written to the markdown files.
    pub fn to_markdown(&self) -> String {
        match self {
            Fragment::Text(text) => format!("{text}\n\n"),
            Fragment::Image { url, index } => format!("\n![pic{index}]({url})\n\n"),
        }
    }
}

/// Two index-aligned fragment sequences: Korean source and English target.
///
/// Every mutation pushes to both sides at once, so the sequences always have
/// the same length and image fragments are identical on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BilingualDocument {
    source: Vec<Fragment>,
    target: Vec<Fragment>,
}

impl BilingualDocument {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a Korean paragraph and its translation.
    pub fn push_text(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.source.push(Fragment::Text(source.into()));
        self.target.push(Fragment::Text(target.into()));
    }

    /// Append the same image to both sides.
    pub fn push_image(&mut self, url: &str, index: usize) {
        let fragment = Fragment::Image {
            url: url.to_string(),
            index,
        };
        self.source.push(fragment.clone());
        self.target.push(fragment);
    }

    /// Korean fragments.
    pub fn source(&self) -> &[Fragment] {
        &self.source
    }

    /// English fragments.
    pub fn target(&self) -> &[Fragment] {
        &self.target
    }

    /// Fragments per side.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// The Korean side rendered fragment by fragment.
    pub fn source_markdown(&self) -> Vec<String> {
        self.source().iter().map(Fragment::to_markdown).collect()
    }

    /// The English side rendered fragment by fragment.
    pub fn target_markdown(&self) -> Vec<String> {
        self.target().iter().map(Fragment::to_markdown).collect()
    }
}

/// Store name and address guessed from a post. Either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub store_name: Option<String>,
    pub address: Option<String>,
}

impl ExtractedFields {
    /// The combined `"store, address"` label, with `None` for missing parts.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ExtractedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}",
            self.store_name.as_deref().unwrap_or("None"),
            self.address.as_deref().unwrap_or("None")
        )
    }
}

/// Where the two markdown files of a post were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPaths {
    pub kor_path: String,
    pub eng_path: String,
}

/// Metadata sidecar for one processed post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMeta {
    /// Published title (the English one).
    pub title: String,
    pub source_title: String,
    pub translated_title: String,
    pub fields: ExtractedFields,
    /// Combined label sent to the itinerary model and the store.
    pub address: String,
    pub tags: Vec<String>,
    /// URL of the Korean source post.
    pub kor_url: String,
    pub image_count: usize,
    pub image_url: Option<String>,
    pub documents: DocumentPaths,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_markdown() {
        assert_eq!(Fragment::Text("본문".into()).to_markdown(), "본문\n\n");
        let img = Fragment::Image {
            url: "https://postfiles.pstatic.net/a.jpg".into(),
            index: 3,
        };
        assert_eq!(
            img.to_markdown(),
            "\n![pic3](https://postfiles.pstatic.net/a.jpg)\n\n"
        );
    }

    #[test]
    fn test_document_sides_stay_aligned() {
        let mut doc = BilingualDocument::new();
        doc.push_text("제목", "Title");
        doc.push_image("https://postfiles.pstatic.net/a.jpg", 1);
        doc.push_text("본문", "Body");

        assert_eq!(doc.source().len(), doc.target().len());
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.source()[1], doc.target()[1]);
        assert_eq!(doc.target_markdown()[0], "Title\n\n");
    }

    #[test]
    fn test_fields_label() {
        let fields = ExtractedFields {
            store_name: Some("연남토마".into()),
            address: Some("서울 마포구 동교로 1".into()),
        };
        assert_eq!(fields.label(), "연남토마, 서울 마포구 동교로 1");
        assert_eq!(ExtractedFields::default().label(), "None, None");
    }

    #[test]
    fn test_post_meta_serialization() {
        let meta = PostMeta {
            title: "Title".into(),
            source_title: "제목".into(),
            translated_title: "Title".into(),
            fields: ExtractedFields::default(),
            address: "None, None".into(),
            tags: vec!["맛집".into()],
            kor_url: "https://blog.naver.com/dev-dev/1".into(),
            image_count: 0,
            image_url: None,
            documents: DocumentPaths {
                kor_path: "kor/제목.md".into(),
                eng_path: "eng/Title.md".into(),
            },
            processed_at: Utc::now(),
        };

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"kor_url\":\"https://blog.naver.com/dev-dev/1\""));
        let back: PostMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tags, vec!["맛집".to_string()]);
    }
}
