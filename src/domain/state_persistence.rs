//! State File Persistence
//!
//! Stores the pair-state snapshot as pretty JSON. Writes go to a temporary
//! file in the same directory, are flushed to disk, and then renamed over
//! the canonical file, so a crash leaves either the old or the new
//! snapshot and never a torn one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::state_store::{PersistError, StateBackend, StateSnapshot};

/// Default state file name
pub const DEFAULT_STATE_FILE: &str = "pairs_state.json";

/// JSON file backend with atomic replace
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backend at the default file name inside `data_dir`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DEFAULT_STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl StateBackend for JsonFileBackend {
    fn read(&self) -> Result<Option<StateSnapshot>, PersistError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| PersistError::ReadError(e.to_string()))?;

        if content.trim().is_empty() {
            return Ok(None);
        }

        let snapshot: StateSnapshot = serde_json::from_str(&content)
            .map_err(|e| PersistError::CorruptedFile(e.to_string()))?;

        tracing::debug!(
            "Loaded {} pair states from {}",
            snapshot.len(),
            self.path.display()
        );

        Ok(Some(snapshot))
    }

    fn write(&self, snapshot: &StateSnapshot) -> Result<(), PersistError> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir).map_err(|e| PersistError::DirectoryError(e.to_string()))?;

        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| PersistError::SerializationError(e.to_string()))?;

        let mut tmp = NamedTempFile::new_in(&dir)
            .map_err(|e| PersistError::WriteError(e.to_string()))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| PersistError::WriteError(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| PersistError::WriteError(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| PersistError::WriteError(e.error.to_string()))?;

        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
