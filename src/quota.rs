//! Monthly translation character budget.
//!
//! The counter is a plain integer persisted through a [`StateStore`]. It only
//! ever grows; nothing resets it when a new month starts.

use crate::state::{StateError, StateStore};
use tracing::{info, instrument, warn};

/// Remaining DeepL free-tier allowance of the deployment this tool runs in.
pub const DEFAULT_MONTHLY_LIMIT: u64 = 493_989;

/// Tracks characters sent for translation across runs.
#[derive(Debug)]
pub struct QuotaTracker<S> {
    store: S,
}

impl<S: StateStore> QuotaTracker<S> {
    /// A tracker persisting its counter through `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The persisted counter.
    ///
    /// Missing or empty state is zero. Unparsable state is quarantined and
    /// counts as zero. A failed read is an error, since the real total is
    /// unknown.
    fn load_counter(&self) -> Result<u64, StateError> {
        let Some(raw) = self.store.load()? else {
            return Ok(0);
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        match trimmed.parse::<u64>() {
            Ok(total) => Ok(total),
            Err(e) => {
                warn!(error = %e, raw = %trimmed, "Corrupt translation counter; treating as 0");
                self.store.quarantine()?;
                Ok(0)
            }
        }
    }

    /// Characters consumed so far.
    ///
    /// Never fails: a counter that cannot be read is logged and reported as
    /// zero. Use [`record`](Self::record) for updates, which refuses to
    /// write over a counter it could not read.
    pub fn consumed(&self) -> u64 {
        self.load_counter().unwrap_or_else(|e| {
            warn!(error = %e, "Could not read translation counter; treating as 0");
            0
        })
    }

    /// Characters left of `monthly_limit`, floored at zero.
    pub fn remaining(&self, monthly_limit: u64) -> u64 {
        monthly_limit.saturating_sub(self.consumed())
    }

    /// Add `chars` to the persisted counter.
    ///
    /// # Arguments
    ///
    /// * `chars` - Characters charged for one post
    ///
    /// # Returns
    ///
    /// The new running total, durable once this returns.
    ///
    /// # Errors
    ///
    /// Fails without writing anything when the current counter cannot be
    /// read, so an I/O hiccup never resets the total. Corrupt contents are
    /// moved aside first and counting restarts from zero.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let quota = QuotaTracker::new(FileStore::new("translation_counter.txt"));
    /// let total = quota.record(1_250)?;
    /// ```
    #[instrument(level = "info", skip(self))]
    pub fn record(&self, chars: u64) -> Result<u64, StateError> {
        let total = self.load_counter()?.saturating_add(chars);
        self.store.save(&total.to_string())?;
        info!(total, "Recorded translated characters");
        Ok(total)
    }
}

/// Sum of trimmed character counts, skipping markdown image lines.
///
/// Characters are Unicode scalar values, not bytes, so Korean text is
/// counted the way the translation service bills it.
///
/// # Arguments
///
/// * `parts` - Rendered markdown fragments of one document
///
/// # Examples
///
/// ```ignore
/// let parts = ["제목\n\n", "\n![pic1](https://postfiles.pstatic.net/a.jpg)\n\n"];
/// assert_eq!(chargeable_character_count(&parts), 2);
/// ```
pub fn chargeable_character_count<T: AsRef<str>>(parts: &[T]) -> u64 {
    parts
        .iter()
        .map(|part| part.as_ref().trim())
        .filter(|part| !part.starts_with("!["))
        .map(|part| part.chars().count() as u64)
        .sum()
}

/// How many more posts of `per_post` characters fit in `remaining`.
/// Zero when `per_post` is zero.
pub fn estimated_posts(remaining: u64, per_post: u64) -> u64 {
    if per_post == 0 { 0 } else { remaining / per_post }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FileStore, MemoryStore, UnreadableStore};
    use tempfile::TempDir;

    #[test]
    fn test_count_skips_images() {
        let parts = ["Title\n\n", "Body\n\n", "![pic1](u)\n\n"];
        assert_eq!(
            chargeable_character_count(&parts),
            ("Title".len() + "Body".len()) as u64
        );
    }

    #[test]
    fn test_count_uses_characters_not_bytes() {
        let parts = ["제목입니다\n\n", "본문 내용입니다.\n\n", "\n![pic1](http://image.url)\n\n"];
        assert_eq!(chargeable_character_count(&parts), 5 + 9);
    }

    #[test]
    fn test_empty_state_is_zero() {
        let quota = QuotaTracker::new(MemoryStore::new());
        assert_eq!(quota.consumed(), 0);
        assert_eq!(quota.remaining(100), 100);
    }

    #[test]
    fn test_corrupt_state_is_zero() {
        let quota = QuotaTracker::new(MemoryStore::with_contents("twelve"));
        assert_eq!(quota.consumed(), 0);
    }

    #[test]
    fn test_corrupt_counter_is_moved_aside_before_recording() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("translation_counter.txt");
        std::fs::write(&path, "12x4").unwrap();

        let quota = QuotaTracker::new(FileStore::new(&path));
        assert_eq!(quota.record(10).unwrap(), 10);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "10");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("translation_counter.txt.corrupt")).unwrap(),
            "12x4"
        );
    }

    #[test]
    fn test_unreadable_counter_is_not_overwritten() {
        let store = UnreadableStore::default();
        let quota = QuotaTracker::new(&store);
        assert_eq!(quota.consumed(), 0);
        assert!(quota.record(10).is_err());
        assert_eq!(*store.saved.lock().unwrap(), None);
    }

    #[test]
    fn test_record_accumulates_and_remaining_floors_at_zero() {
        let quota = QuotaTracker::new(MemoryStore::new());
        assert_eq!(quota.record(60).unwrap(), 60);
        assert_eq!(quota.record(50).unwrap(), 110);
        assert_eq!(quota.remaining(100), 0);
        assert_eq!(quota.remaining(500), 390);
    }

    #[test]
    fn test_record_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("translation_counter.txt");

        QuotaTracker::new(FileStore::new(&path)).record(1234).unwrap();
        let reopened = QuotaTracker::new(FileStore::new(&path));
        assert_eq!(reopened.consumed(), 1234);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1234");
    }

    #[test]
    fn test_estimated_posts() {
        assert_eq!(estimated_posts(1000, 300), 3);
        assert_eq!(estimated_posts(1000, 0), 0);
    }
}
