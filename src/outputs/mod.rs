//! Local persistence of processed posts.
//!
//! - [`markdown`]: the Korean and English markdown documents
//! - [`json`]: the `.meta.json` sidecar next to the English document
//!
//! ```text
//! output_dir/
//! ├── kor/
//! │   └── [연남] 파스타.md
//! └── eng/
//!     ├── [Yeonnam] Pasta korea hongdae.md
//!     └── [Yeonnam] Pasta korea hongdae.meta.json
//! ```

pub mod json;
pub mod markdown;

/// Directory holding the Korean documents.
pub const KOR_DIR: &str = "kor";
/// Directory holding the English documents and sidecars.
pub const ENG_DIR: &str = "eng";
