//! Naver SmartEditor content extraction.
//!
//! A rendered post body (`.se-main-container`) is a flat run of
//! `div.se-component` blocks. Text blocks hold `p.se-text-paragraph`
//! paragraphs; image blocks hold one or many `img` nodes. The class names of
//! image blocks changed across editor versions, so several are accepted.
//!
//! Extraction happens in two steps:
//! 1. [`parse_blocks`] walks the markup into plain [`Block`]s (sync, pure)
//! 2. [`extract_document`] translates paragraphs and builds the
//!    [`BilingualDocument`]
//!
//! Only images served from [`TRUSTED_IMAGE_HOST`] are kept.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

use crate::models::BilingualDocument;
use crate::translate::{Translate, Translator};

/// Host of Naver's post image CDN.
pub const TRUSTED_IMAGE_HOST: &str = "postfiles.pstatic.net";

const TEXT_CLASSES: &[&str] = &["se-text"];
const SINGLE_IMAGE_CLASSES: &[&str] = &["se-image"];
const IMAGE_GROUP_CLASSES: &[&str] = &[
    "se-section-imageGroup",
    "se-l-collage",
    "__se-component",
    "se-imageStrip",
    "se-imageGroup",
];

static COMPONENT: Lazy<Selector> = Lazy::new(|| Selector::parse("div.se-component").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p.se-text-paragraph").unwrap());
static IMAGE_RESOURCE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img.se-image-resource").unwrap());
static ANY_IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

/// A content block in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(String),
    /// Absolute URL of an image on the trusted CDN.
    Image(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComponentKind {
    Text,
    SingleImage,
    ImageGroup,
}

fn classify(component: &ElementRef<'_>) -> Option<ComponentKind> {
    let has_any = |names: &[&str]| component.value().classes().any(|c| names.contains(&c));
    if has_any(TEXT_CLASSES) {
        Some(ComponentKind::Text)
    } else if has_any(SINGLE_IMAGE_CLASSES) {
        Some(ComponentKind::SingleImage)
    } else if has_any(IMAGE_GROUP_CLASSES) {
        Some(ComponentKind::ImageGroup)
    } else {
        None
    }
}

/// Resolved image URL, preferring the lazy-load attribute.
fn image_source(img: &ElementRef<'_>) -> Option<String> {
    let element = img.value();
    element
        .attr("data-lazy-src")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| element.attr("src"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The absolute URL of `src` if it is served from [`TRUSTED_IMAGE_HOST`].
pub fn trusted_image_url(src: &str) -> Option<String> {
    let absolute = if src.starts_with("//") {
        format!("https:{src}")
    } else {
        src.to_string()
    };
    let url = Url::parse(&absolute).ok()?;
    if url.host_str()?.contains(TRUSTED_IMAGE_HOST) {
        Some(absolute)
    } else {
        None
    }
}

fn push_images<'a>(blocks: &mut Vec<Block>, images: impl Iterator<Item = ElementRef<'a>>) {
    for img in images {
        match image_source(&img) {
            Some(src) => match trusted_image_url(&src) {
                Some(url) => blocks.push(Block::Image(url)),
                None => debug!(%src, "Dropping image from untrusted host"),
            },
            None => debug!("Image without a source; skipping"),
        }
    }
}

/// Walk the main container markup into content blocks.
pub fn parse_blocks(main_html: &str) -> Vec<Block> {
    let fragment = Html::parse_fragment(main_html);
    let mut blocks = Vec::new();

    for component in fragment.select(&COMPONENT) {
        match classify(&component) {
            Some(ComponentKind::Text) => {
                let before = blocks.len();
                for p in component.select(&PARAGRAPH) {
                    let text = p.text().collect::<String>();
                    let text = text.trim();
                    if !text.is_empty() {
                        blocks.push(Block::Paragraph(text.to_string()));
                    }
                }
                if blocks.len() == before {
                    debug!("Text component without paragraphs; skipping");
                }
            }
            Some(ComponentKind::SingleImage) => match component.select(&IMAGE_RESOURCE).next() {
                Some(img) => push_images(&mut blocks, std::iter::once(img)),
                None => debug!("Image component without an image resource; skipping"),
            },
            Some(ComponentKind::ImageGroup) => {
                push_images(&mut blocks, component.select(&ANY_IMAGE));
            }
            None => {}
        }
    }

    blocks
}

/// Result of [`extract_document`].
#[derive(Debug, Clone)]
pub struct Extraction {
    pub document: BilingualDocument,
    /// Image counter after extraction. It starts at 1, so it is one more
    /// than the number of images emitted.
    pub image_counter: usize,
}

impl Extraction {
    /// Number of image fragments in the document.
    pub fn images_emitted(&self) -> usize {
        self.image_counter.saturating_sub(1)
    }
}

/// Build the bilingual document for a rendered post.
///
/// The title pair comes first. Paragraphs are translated one by one in
/// document order, and each trusted image is pushed to both sides with the
/// next index, starting at 1. A paragraph whose translation fails keeps its
/// Korean text on the English side.
///
/// # Arguments
///
/// * `title` - Korean post title
/// * `translated_title` - English title, already translated
/// * `main_html` - Markup of the `.se-main-container` element
/// * `translator` - Used for every paragraph
///
/// # Returns
///
/// The aligned document together with the final image counter.
///
/// # Examples
///
/// ```ignore
/// let extraction = extract_document("연남 맛집", "Yeonnam eats", &html, &translator).await;
/// assert_eq!(extraction.document.source().len(), extraction.document.target().len());
/// println!("{} images", extraction.images_emitted());
/// ```
#[instrument(level = "info", skip_all, fields(title = %title))]
pub async fn extract_document<T: Translate>(
    title: &str,
    translated_title: &str,
    main_html: &str,
    translator: &Translator<T>,
) -> Extraction {
    let blocks = parse_blocks(main_html);

    let mut document = BilingualDocument::new();
    document.push_text(title, translated_title);

    let mut image_counter = 1usize;
    for block in blocks {
        match block {
            Block::Paragraph(text) => {
                let translated = translator.translate(&text).await;
                document.push_text(text, translated);
            }
            Block::Image(url) => {
                document.push_image(&url, image_counter);
                image_counter += 1;
            }
        }
    }

    info!(
        fragments = document.len(),
        images = image_counter - 1,
        "Extracted post content"
    );
    Extraction {
        document,
        image_counter,
    }
}
