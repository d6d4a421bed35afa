//! Small durable state files (processed posts, translation counter).
//!
//! Both files are read once at start-up and rewritten whole on every update.
//! [`FileStore`] writes to a temporary sibling, syncs it, and renames it over
//! the target so a crash never leaves a half-written file behind.
//! [`MemoryStore`] backs the same contract in tests.
//!
//! Contents that cannot be parsed are never silently overwritten: callers
//! move them aside with [`StateStore::quarantine`] first, which for a
//! [`FileStore`] renames the file to `<name>.corrupt`.
//!
//! There is no locking: two runs sharing a state directory can still lose
//! updates.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
#[cfg(test)]
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

/// Suffix given to state files whose contents could not be parsed.
pub const QUARANTINE_SUFFIX: &str = ".corrupt";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The state could not be read at start-up, so writing it would replace
    /// history that was never seen.
    #[error("refusing to overwrite state that could not be read")]
    Unreadable,
    #[cfg(test)]
    #[error("state store lock poisoned")]
    Poisoned,
}

/// Load/save contract for a single blob of persisted state.
pub trait StateStore {
    /// Read the stored contents.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when nothing has been saved yet, `Ok(Some(contents))`
    /// otherwise. Any other read failure is an error; callers must not treat
    /// it as "empty".
    fn load(&self) -> Result<Option<String>, StateError>;

    /// Replaces the stored contents. Durable once this returns.
    fn save(&self, contents: &str) -> Result<(), StateError>;

    /// Move the current contents aside so a later [`save`](Self::save)
    /// cannot destroy them.
    ///
    /// Called when the contents exist but cannot be parsed. Succeeds without
    /// doing anything when there is nothing stored.
    fn quarantine(&self) -> Result<(), StateError>;
}

impl<S: StateStore + ?Sized> StateStore for &S {
    fn load(&self) -> Result<Option<String>, StateError> {
        (**self).load()
    }

    fn save(&self, contents: &str) -> Result<(), StateError> {
        (**self).save(contents)
    }

    fn quarantine(&self) -> Result<(), StateError> {
        (**self).quarantine()
    }
}

/// A state file on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// A store backed by the file at `path`. Nothing is touched until the
    /// first load or save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    /// Where [`StateStore::quarantine`] moves unparsable contents.
    pub fn quarantine_path(&self) -> PathBuf {
        self.sibling(QUARANTINE_SUFFIX)
    }
}

impl StateStore for FileStore {
    fn load(&self) -> Result<Option<String>, StateError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn save(&self, contents: &str) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let tmp = self.temp_path();
        let mut file = fs::File::create(&tmp).map_err(|e| self.io_error(e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), bytes = contents.len(), "Saved state file");
        Ok(())
    }

    fn quarantine(&self) -> Result<(), StateError> {
        let target = self.quarantine_path();
        match fs::rename(&self.path, &target) {
            Ok(()) => {
                warn!(
                    path = %self.path.display(),
                    moved_to = %target.display(),
                    "Moved unreadable state file aside"
                );
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-memory state.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Mutex<Option<String>>,
    quarantined: Mutex<Option<String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: &str) -> Self {
        Self {
            contents: Mutex::new(Some(contents.to_string())),
            ..Self::default()
        }
    }

    /// Contents moved aside by the last quarantine.
    pub fn quarantined(&self) -> Option<String> {
        self.quarantined.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<String>, StateError> {
        let guard = self.contents.lock().map_err(|_| StateError::Poisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, contents: &str) -> Result<(), StateError> {
        let mut guard = self.contents.lock().map_err(|_| StateError::Poisoned)?;
        *guard = Some(contents.to_string());
        Ok(())
    }

    fn quarantine(&self) -> Result<(), StateError> {
        let mut contents = self.contents.lock().map_err(|_| StateError::Poisoned)?;
        if let Some(raw) = contents.take() {
            *self.quarantined.lock().map_err(|_| StateError::Poisoned)? = Some(raw);
        }
        Ok(())
    }
}

/// A store that can be written but never read.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct UnreadableStore {
    pub saved: Mutex<Option<String>>,
}

#[cfg(test)]
impl StateStore for UnreadableStore {
    fn load(&self) -> Result<Option<String>, StateError> {
        Err(StateError::Io {
            path: "unreadable".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        })
    }

    fn save(&self, contents: &str) -> Result<(), StateError> {
        *self.saved.lock().unwrap() = Some(contents.to_string());
        Ok(())
    }

    fn quarantine(&self) -> Result<(), StateError> {
        Ok(())
    }
}
