//! String and file-system helpers.
//!
//! - Truncation for logs and summaries (character-boundary safe)
//! - File-name sanitization for post titles
//! - Output directory validation

use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Characters that cannot appear in a file name on common file systems.
const FORBIDDEN_FILENAME_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Longest file stem produced by [`sanitize_filename`], in characters.
pub const MAX_FILENAME_CHARS: usize = 100;

/// Used when a title sanitizes down to nothing.
pub const FALLBACK_FILENAME: &str = "untitled_blog_post";

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters and suffixed with the number of
/// bytes dropped.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// The first `n` characters of `s`.
pub fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        None => s,
        Some((cut, _)) => &s[..cut],
    }
}

/// Strip characters that are illegal in file names and cap the length.
///
/// Applying it twice gives the same result as applying it once.
pub fn sanitize_filename(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|c| !FORBIDDEN_FILENAME_CHARS.contains(c))
        .collect();
    take_chars(&stripped, MAX_FILENAME_CHARS).to_string()
}

/// [`sanitize_filename`], falling back to [`FALLBACK_FILENAME`] when nothing
/// usable remains.
pub fn file_stem_for(title: &str) -> String {
    let stem = sanitize_filename(title.trim());
    if stem.trim().is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        stem.trim().to_string()
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and deletes a scratch file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let check_path = format!("{}/..__write_check__", path.trim_end_matches('/'));
    match stdfs::File::create(&check_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&check_path);
            info!("Directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte() {
        let result = truncate_for_log("가나다라", 2);
        assert_eq!(result, "가나…(+6 bytes)");
    }

    #[test]
    fn test_take_chars() {
        assert_eq!(take_chars("연남동 맛집", 3), "연남동");
        assert_eq!(take_chars("abc", 10), "abc");
    }

    #[test]
    fn test_sanitize_filename_strips_forbidden() {
        let cleaned = sanitize_filename("테스트/제목:불가?*<>|\\\"");
        assert_eq!(cleaned, "테스트제목불가");
        assert!(!cleaned.contains(FORBIDDEN_FILENAME_CHARS));
    }

    #[test]
    fn test_sanitize_filename_idempotent() {
        let long = "긴/제목".repeat(60);
        let titles = [
            "Test/Title:Invalid?*<>|",
            "[연남] 토마토 파스타 맛집 \"추천\"",
            long.as_str(),
            "",
        ];
        for title in titles {
            let once = sanitize_filename(title);
            assert_eq!(sanitize_filename(&once), once);
            assert!(once.chars().count() <= MAX_FILENAME_CHARS);
        }
    }

    #[test]
    fn test_file_stem_fallback() {
        assert_eq!(file_stem_for("???"), FALLBACK_FILENAME);
        assert_eq!(file_stem_for("  제목  "), "제목");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out/kor");
        ensure_writable_dir(target.to_str().unwrap()).await.unwrap();
        assert!(target.is_dir());
    }
}
