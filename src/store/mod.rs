//! Local key-value store for client-side state.
//!
//! DESIGN
//! ======
//! Templates, submissions, the document-control mapping cache and the list
//! of running scans live on the operator's machine, not in the backend. Each
//! key holds one JSON array that is read and rewritten whole on every
//! mutation: last writer wins, no locking across processes.
//!
//! `FileStore` keeps one `<key>.json` file per key and replaces it via a
//! temp-file rename so a crash never leaves half a document behind.
//! `MemoryStore` backs tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub const TEMPLATES_KEY: &str = "compliance_templates";
pub const SUBMISSIONS_KEY: &str = "template_submissions";
pub const MAPPINGS_KEY: &str = "document_control_mappings";
pub const RUNNING_SCANS_KEY: &str = "running_scans";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored value for '{key}' is not valid JSON: {message}")]
    Corrupt { key: String, message: String },
    #[error("value for '{key}' could not be serialized: {message}")]
    Serialize { key: String, message: String },
    #[error("invalid store key '{0}'")]
    InvalidKey(String),
}

/// Raw string storage addressed by key.
pub trait KvStore: Send + Sync {
    /// Read the value for `key`, `None` when never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`; deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Load the JSON array stored under `key`; a missing key is an empty list.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] when the stored text is not a JSON array of `T`.
pub fn read_list<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Vec<T>, StoreError> {
    match store.get(key)? {
        None => Ok(Vec::new()),
        Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corrupt { key: key.to_string(), message: e.to_string() }),
    }
}

/// Replace the JSON array stored under `key`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_list<T: Serialize>(store: &dyn KvStore, key: &str, items: &[T]) -> Result<(), StoreError> {
    let raw = serde_json::to_string_pretty(items)
        .map_err(|e| StoreError::Serialize { key: key.to_string(), message: e.to_string() })?;
    store.set(key, &raw)
}

// =============================================================================
// FILE STORE
// =============================================================================

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io { path: path.to_path_buf(), source }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        std::fs::write(&tmp, value).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_err(&path))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
