//! Fetching a rendered Naver blog post.
//!
//! A blog post page is a shell whose content lives in `iframe#mainFrame`.
//! [`HttpRenderer`] loads the shell, follows the frame, and returns the
//! title and the inner HTML of `.se-main-container`. Everything after that
//! is pure parsing in [`crate::extract`].

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

/// Title used when no selector and no `<title>` produces one.
pub const UNTITLED: &str = "제목 없음";

const TITLE_SELECTORS: &[&str] = &[
    ".se-title-text",
    ".se_editArea",
    ".se_editable",
    ".pcol1",
    "h1",
    "h2",
    "h3",
    "div[role='heading']",
];

static MAIN_FRAME: Lazy<Selector> = Lazy::new(|| Selector::parse("iframe#mainFrame").unwrap());
static MAIN_CONTAINER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".se-main-container").unwrap());
static DOCUMENT_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static TITLE_CHAIN: Lazy<Vec<Selector>> = Lazy::new(|| {
    TITLE_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("page request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid post URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("element not found: {0}")]
    MissingElement(&'static str),
}

/// The parts of a post page the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPost {
    pub title: String,
    /// Inner HTML of the main content container.
    pub main_html: String,
}

/// Supplies rendered post markup.
pub trait Renderer {
    async fn render(&self, url: &str) -> Result<RenderedPost, RenderError>;
}

/// Renders posts with plain HTTP requests.
///
/// One client serves the whole run and is released when the renderer drops.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    /// A renderer sharing `client` with the rest of the run.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &Url) -> Result<String, RenderError> {
        let body = self
            .client
            .get(url.as_str())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

impl Renderer for HttpRenderer {
    #[instrument(level = "info", skip(self))]
    async fn render(&self, url: &str) -> Result<RenderedPost, RenderError> {
        let page_url = Url::parse(url)?;
        let page = self.get(&page_url).await?;

        let frame_html = match frame_src(&page) {
            Some(src) => {
                let frame_url = page_url.join(&src)?;
                debug!(%frame_url, "Following main frame");
                self.get(&frame_url).await?
            }
            None => page,
        };

        let rendered = parse_rendered(&frame_html)?;
        info!(title = %rendered.title, bytes = rendered.main_html.len(), "Rendered post");
        Ok(rendered)
    }
}

/// `src` of the post content frame, if the page has one.
pub fn frame_src(page_html: &str) -> Option<String> {
    Html::parse_document(page_html)
        .select(&MAIN_FRAME)
        .next()
        .and_then(|frame| frame.value().attr("src"))
        .map(str::to_string)
}

/// Title and main container of the post content document.
pub fn parse_rendered(frame_html: &str) -> Result<RenderedPost, RenderError> {
    let document = Html::parse_document(frame_html);
    let main_html = document
        .select(&MAIN_CONTAINER)
        .next()
        .map(|el| el.inner_html())
        .ok_or(RenderError::MissingElement(".se-main-container"))?;

    Ok(RenderedPost {
        title: resolve_title(&document),
        main_html,
    })
}

fn resolve_title(document: &Html) -> String {
    let from_selectors = TITLE_CHAIN.iter().find_map(|selector| {
        document.select(selector).find_map(|el| {
            let text = el.text().collect::<String>();
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
    });
    if let Some(title) = from_selectors {
        return title;
    }

    document
        .select(&DOCUMENT_TITLE)
        .next()
        .map(|el| el.text().collect::<String>())
        .and_then(|raw| raw.split(" : ").next().map(|s| s.trim().to_string()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Serves a fixed post, or fails.
    #[derive(Debug)]
    pub(crate) enum StaticRenderer {
        Post(RenderedPost),
        Missing,
    }

    impl Renderer for StaticRenderer {
        async fn render(&self, _url: &str) -> Result<RenderedPost, RenderError> {
            match self {
                StaticRenderer::Post(post) => Ok(post.clone()),
                StaticRenderer::Missing => Err(RenderError::MissingElement(".se-main-container")),
            }
        }
    }

    #[test]
    fn test_frame_src() {
        let page = r#"<html><body><iframe id="mainFrame" src="/PostView.naver?blogId=dev-dev&amp;logNo=1"></iframe></body></html>"#;
        assert_eq!(
            frame_src(page).as_deref(),
            Some("/PostView.naver?blogId=dev-dev&logNo=1")
        );
        assert_eq!(frame_src("<html><body></body></html>"), None);
    }

    #[test]
    fn test_parse_rendered_with_title_text() {
        let html = r#"<html><head><title>무시 : 네이버 블로그</title></head><body>
            <div class="se-title-text"><span> [연남] 파스타 </span></div>
            <div class="se-main-container"><div class="se-component se-text"></div></div>
        </body></html>"#;
        let post = parse_rendered(html).unwrap();
        assert_eq!(post.title, "[연남] 파스타");
        assert!(post.main_html.contains("se-component"));
    }

    #[test]
    fn test_title_falls_back_to_document_title() {
        let html = r#"<html><head><title>합정 라멘 : 네이버 블로그</title></head><body>
            <div class="se-main-container"></div>
        </body></html>"#;
        assert_eq!(parse_rendered(html).unwrap().title, "합정 라멘");
    }

    #[test]
    fn test_title_falls_back_to_placeholder() {
        let html = r#"<html><body><div class="se-main-container"></div></body></html>"#;
        assert_eq!(parse_rendered(html).unwrap().title, UNTITLED);
    }

    #[test]
    fn test_missing_container_is_an_error() {
        let err = parse_rendered("<html><body><p>old editor</p></body></html>").unwrap_err();
        assert!(matches!(err, RenderError::MissingElement(_)));
    }
}
