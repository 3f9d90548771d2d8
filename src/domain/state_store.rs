//! Pair State Store
//!
//! In-memory map of pair states backed by a durable [`StateBackend`].
//! Every decision-relevant write (`overwrite`, `update`) persists the full
//! snapshot before returning; if persisting fails the in-memory change is
//! rolled back so memory never claims something disk does not hold.
//! Writes that never gate a notification (`stage`, `record_price`) stay in
//! memory until the next persist or `flush`.
//!
//! Every persist re-reads the backend and merges it first, so a newer
//! session written by another process (a manual reset) is adopted rather
//! than overwritten by this process's snapshot.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::pair_state::{MergeOutcome, PairState};

/// Full durable layout: pair id -> state
pub type StateSnapshot = BTreeMap<String, PairState>;

#[derive(Error, Debug, Clone)]
pub enum PersistError {
    #[error("Failed to serialize state: {0}")]
    SerializationError(String),

    #[error("Failed to write state file: {0}")]
    WriteError(String),

    #[error("Failed to read state file: {0}")]
    ReadError(String),

    #[error("State file is corrupted: {0}")]
    CorruptedFile(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),

    #[error("A newer session for {0} was written externally; local change dropped")]
    Superseded(String),
}

/// Durable storage for the whole snapshot
pub trait StateBackend: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet
    fn read(&self) -> Result<Option<StateSnapshot>, PersistError>;

    /// Must replace the stored snapshot atomically
    fn write(&self, snapshot: &StateSnapshot) -> Result<(), PersistError>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Volatile backend for tests and dry runs.
///
/// Clones share storage, so a second store built from a clone sees what the
/// first one persisted (a simulated restart).
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    stored: Arc<Mutex<Option<StateSnapshot>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    /// What is currently durable
    pub fn stored(&self) -> Option<StateSnapshot> {
        self.stored.lock().ok().and_then(|s| s.clone())
    }
}

impl StateBackend for MemoryBackend {
    fn read(&self) -> Result<Option<StateSnapshot>, PersistError> {
        self.stored
            .lock()
            .map(|s| s.clone())
            .map_err(|e| PersistError::ReadError(e.to_string()))
    }

    fn write(&self, snapshot: &StateSnapshot) -> Result<(), PersistError> {
        let fail = self.fail_writes.lock().map(|f| *f).unwrap_or(true);
        if fail {
            return Err(PersistError::WriteError("simulated write failure".to_string()));
        }
        let mut stored = self
            .stored
            .lock()
            .map_err(|e| PersistError::WriteError(e.to_string()))?;
        *stored = Some(snapshot.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

/// Result of syncing from durable storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: usize,
    pub adopted: usize,
    pub merged: usize,
    pub kept: usize,
}

impl LoadReport {
    pub fn total(&self) -> usize {
        self.inserted + self.adopted + self.merged + self.kept
    }
}

/// Repository of pair states
pub struct StateStore {
    states: StateSnapshot,
    backend: Box<dyn StateBackend>,
    dirty: bool,
}

impl StateStore {
    pub fn new(backend: Box<dyn StateBackend>) -> Self {
        Self {
            states: StateSnapshot::new(),
            backend,
            dirty: false,
        }
    }

    /// Create and load in one step
    pub fn open(backend: Box<dyn StateBackend>) -> Result<Self, PersistError> {
        let mut store = Self::new(backend);
        store.load()?;
        Ok(store)
    }

    pub fn location(&self) -> String {
        self.backend.describe()
    }

    /// Re-sync from durable storage using the session-aware merge policy.
    ///
    /// Pairs present only in memory are left alone.
    pub fn load(&mut self) -> Result<LoadReport, PersistError> {
        let mut report = LoadReport::default();
        let Some(snapshot) = self.backend.read()? else {
            return Ok(report);
        };

        for (pair, disk) in snapshot {
            match self.states.entry(pair) {
                Entry::Vacant(slot) => {
                    slot.insert(disk);
                    report.inserted += 1;
                }
                Entry::Occupied(mut slot) => match slot.get_mut().merge_persisted(disk) {
                    MergeOutcome::Adopted => report.adopted += 1,
                    MergeOutcome::Merged => report.merged += 1,
                    MergeOutcome::Kept => report.kept += 1,
                },
            }
        }
        Ok(report)
    }

    /// State for `pair`, created with defaults on first lookup
    pub fn get(&mut self, pair: &str) -> &PairState {
        self.states.entry(pair.to_string()).or_default()
    }

    /// Read-only lookup without creating
    pub fn peek(&self, pair: &str) -> Option<&PairState> {
        self.states.get(pair)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PairState)> {
        self.states.iter()
    }

    /// Replace the whole state for `pair` and persist before returning.
    ///
    /// Fails with [`PersistError::Superseded`] when the backend already holds
    /// a newer session for `pair`; memory then carries that session.
    pub fn overwrite(&mut self, pair: &str, state: PairState) -> Result<(), PersistError> {
        let session = state.session_started_at;
        let previous = self.states.insert(pair.to_string(), state);

        self.sync_before_write();
        if self.states.get(pair).map(|s| s.session_started_at) != Some(session) {
            tracing::info!("[SYNC] {}: newer session on disk, local change dropped", pair);
            return Err(PersistError::Superseded(pair.to_string()));
        }

        if let Err(e) = self.write_snapshot() {
            match previous {
                Some(prev) => self.states.insert(pair.to_string(), prev),
                None => self.states.remove(pair),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Apply `change` to `pair` and persist before returning
    pub fn update<F>(&mut self, pair: &str, change: F) -> Result<(), PersistError>
    where
        F: FnOnce(&mut PairState),
    {
        let mut next = self.get(pair).clone();
        change(&mut next);
        self.overwrite(pair, next)
    }

    /// Replace the state for `pair` without persisting.
    ///
    /// For changes that never gate a notification (bootstrap, a lower local
    /// min). They reach disk with the next persist or `flush`.
    pub fn stage(&mut self, pair: &str, state: PairState) {
        self.states.insert(pair.to_string(), state);
        self.dirty = true;
    }

    /// Bookkeeping-only price update, persisted on the next write or `flush`
    pub fn record_price(&mut self, pair: &str, price: f64, now: DateTime<Utc>) {
        let state = self.states.entry(pair.to_string()).or_default();
        if state.last_price != Some(price) {
            state.last_price = Some(price);
            state.last_update = Some(now);
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist pending staged and bookkeeping changes
    pub fn flush(&mut self) -> Result<(), PersistError> {
        if self.dirty {
            self.sync_before_write();
            self.write_snapshot()?;
        }
        Ok(())
    }

    // An unreadable backend leaves memory authoritative; the write replaces it
    fn sync_before_write(&mut self) {
        match self.load() {
            Ok(sync) if sync.adopted > 0 => tracing::info!(
                "Adopted {} newer sessions from {} before writing",
                sync.adopted,
                self.backend.describe()
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!("Re-read before write failed, keeping memory: {}", e),
        }
    }

    fn write_snapshot(&mut self) -> Result<(), PersistError> {
        self.backend.write(&self.states)?;
        self.dirty = false;
        Ok(())
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("pairs", &self.states.len())
            .field("backend", &self.backend.describe())
            .field("dirty", &self.dirty)
            .finish()
    }
}
