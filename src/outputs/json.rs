//! The `.meta.json` sidecar written next to each English document.
//!
//! The sidecar is pretty-printed UTF-8 JSON of [`PostMeta`]; Korean text is
//! written as-is, not escaped.

use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

use super::ENG_DIR;
use crate::models::PostMeta;
use crate::utils::file_stem_for;

/// Write `meta` to `{output_dir}/eng/{stem}.meta.json`, where the stem is the
/// sanitized published title. Returns the written path.
#[instrument(level = "info", skip_all, fields(%output_dir, title = %meta.title))]
pub async fn write_meta(meta: &PostMeta, output_dir: &str) -> Result<String, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(meta)?;

    let dir = Path::new(output_dir).join(ENG_DIR);
    if let Err(e) = fs::create_dir_all(&dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create meta dir");
        return Err(e.into());
    }

    let path = dir.join(format!("{}.meta.json", file_stem_for(&meta.title)));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote post metadata");

    Ok(path.to_string_lossy().into_owned())
}
