//! The buffer-backup persistence seam.
//!
//! The storage medium for an Observation's ring-buffer backup is an
//! external collaborator: the core only knows how to serialize a
//! buffer to the documented JSON form and ask for it to be written or
//! restored. `BufferBackupStore` is that narrow interface;
//! `JsonFileBackupStore` is a default, swappable implementation, kept
//! behind a trait rather than hard-wiring one storage technology into
//! the core types.

use std::fs;
use std::path::PathBuf;

use crate::error::{HubError, Result};

/// Reads and writes an observation's buffer backup, keyed by the
/// observation's tree path. Implementors decide the storage medium;
/// the core never inspects the bytes beyond the documented JSON array
/// format.
pub trait BufferBackupStore {
    /// Persist `json` (the buffer export format) for the observation
    /// at `path`.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Fault` if the underlying medium rejects the
    /// write.
    fn write_buffer(&self, path: &str, json: &str) -> Result<()>;

    /// Load a previously persisted buffer for `path`, if any.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Fault` if the underlying medium is present
    /// but unreadable (corrupt file, I/O error); a missing backup is
    /// `Ok(None)`, not an error.
    fn read_buffer(&self, path: &str) -> Result<Option<String>>;
}

/// A `BufferBackupStore` that writes one JSON file per observation
/// path under a base directory, sanitizing `/` in the path into a
/// filesystem-safe form.
pub struct JsonFileBackupStore {
    base_dir: PathBuf,
}

impl JsonFileBackupStore {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn file_path(&self, obs_path: &str) -> PathBuf {
        let sanitized = obs_path.trim_start_matches('/').replace('/', "__");
        self.base_dir.join(format!("{sanitized}.json"))
    }
}

impl BufferBackupStore for JsonFileBackupStore {
    fn write_buffer(&self, path: &str, json: &str) -> Result<()> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir)
                .map_err(|e| HubError::fault(format!("create backup dir: {e}")))?;
        }
        fs::write(self.file_path(path), json)
            .map_err(|e| HubError::fault(format!("write backup for '{path}': {e}")))
    }

    fn read_buffer(&self, path: &str) -> Result<Option<String>> {
        let file = self.file_path(path);
        if !file.exists() {
            return Ok(None);
        }
        fs::read_to_string(file)
            .map(Some)
            .map_err(|e| HubError::fault(format!("read backup for '{path}': {e}")))
    }
}

/// A `BufferBackupStore` that discards writes and never has a backup
/// to restore. Useful for tests and for embeddings that opt out of
/// buffer persistence entirely (`bufferBackupPeriod == 0`).
pub struct NullBackupStore;

impl BufferBackupStore for NullBackupStore {
    fn write_buffer(&self, _path: &str, _json: &str) -> Result<()> {
        Ok(())
    }

    fn read_buffer(&self, _path: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
