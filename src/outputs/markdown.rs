//! Markdown documents for both sides of a post.
//!
//! Each side is written as the concatenation of its fragments' markdown,
//! named after the sanitized title of that side.

use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

use super::{ENG_DIR, KOR_DIR};
use crate::models::{BilingualDocument, DocumentPaths};
use crate::utils::file_stem_for;

/// Join rendered fragments into one document body.
pub fn document_body(fragments: &[String]) -> String {
    fragments.concat()
}

/// Write `fragments` to `{dir}/{stem}.md`, creating `dir` if needed.
async fn write_document(
    dir: &Path,
    stem: &str,
    fragments: &[String],
) -> Result<String, Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create markdown dir");
        return Err(e.into());
    }

    let path = dir.join(format!("{stem}.md"));
    fs::write(&path, document_body(fragments)).await?;
    info!(path = %path.display(), fragments = fragments.len(), "Wrote markdown");
    Ok(path.to_string_lossy().into_owned())
}

/// Write the Korean and English documents of a post under `output_dir`.
#[instrument(level = "info", skip_all, fields(%output_dir, %source_title))]
pub async fn write_documents(
    output_dir: &str,
    document: &BilingualDocument,
    source_title: &str,
    translated_title: &str,
) -> Result<DocumentPaths, Box<dyn Error>> {
    let root = Path::new(output_dir);
    let kor_path = write_document(
        &root.join(KOR_DIR),
        &file_stem_for(source_title),
        &document.source_markdown(),
    )
    .await?;
    let eng_path = write_document(
        &root.join(ENG_DIR),
        &file_stem_for(translated_title),
        &document.target_markdown(),
    )
    .await?;

    Ok(DocumentPaths { kor_path, eng_path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_documents_layout() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().to_str().unwrap();

        let mut doc = BilingualDocument::new();
        doc.push_text("[연남] 파스타", "[Yeonnam] Pasta");
        doc.push_image("https://postfiles.pstatic.net/a.jpg", 1);
        doc.push_text("맛있다", "Delicious");

        let paths = write_documents(out, &doc, "[연남] 파스타", "Pasta: a/b")
            .await
            .unwrap();

        assert!(paths.kor_path.ends_with("kor/[연남] 파스타.md"));
        assert!(paths.eng_path.ends_with("eng/Pasta ab.md"));

        let kor = std::fs::read_to_string(&paths.kor_path).unwrap();
        assert_eq!(
            kor,
            "[연남] 파스타\n\n\n![pic1](https://postfiles.pstatic.net/a.jpg)\n\n맛있다\n\n"
        );
        let eng = std::fs::read_to_string(&paths.eng_path).unwrap();
        assert!(eng.starts_with("[Yeonnam] Pasta\n\n"));
        assert!(eng.ends_with("Delicious\n\n"));
    }

    #[tokio::test]
    async fn test_empty_titles_use_fallback_name() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().to_str().unwrap();
        let paths = write_documents(out, &BilingualDocument::new(), "???", "")
            .await
            .unwrap();
        assert!(paths.kor_path.ends_with("untitled_blog_post.md"));
        assert!(paths.eng_path.ends_with("untitled_blog_post.md"));
    }
}
