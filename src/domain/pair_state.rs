//! Per-Pair Tracking State
//!
//! One `PairState` per monitored pair. A drawdown session is the
//! `local_max` / `local_min` / `triggered_levels` triple; it is only ever
//! replaced as a whole (see [`PairState::fresh_session`]).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted tracking state for one pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairState {
    /// Highest price seen since the session started
    pub local_max: Option<f64>,
    /// When `local_max` was last set
    pub local_max_time: Option<DateTime<Utc>>,
    /// Lowest price seen since the session started
    pub local_min: Option<f64>,
    /// Levels already fired in this session
    pub triggered_levels: BTreeSet<u32>,
    pub last_signal_level: Option<u32>,
    pub last_signal_time: Option<DateTime<Utc>>,
    pub last_signal_price: Option<f64>,
    pub last_signal_drop_percent: Option<f64>,
    /// Diagnostics only
    pub last_price: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
    pub initialized: bool,
    pub initialization_time: Option<DateTime<Utc>>,
    /// Identity of the current session, used when merging with disk
    pub session_started_at: Option<DateTime<Utc>>,
}

/// What happened to an in-memory state when a persisted copy was merged in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Disk carried a newer session; it replaced the in-memory one
    Adopted,
    /// Same session; decision-critical fields were combined
    Merged,
    /// Disk copy was older; in-memory state kept as is
    Kept,
}

impl PairState {
    /// A new session anchored at `price`
    pub fn fresh_session(price: f64, now: DateTime<Utc>) -> Self {
        Self {
            local_max: Some(price),
            local_max_time: Some(now),
            local_min: Some(price),
            triggered_levels: BTreeSet::new(),
            last_signal_level: None,
            last_signal_time: None,
            last_signal_price: None,
            last_signal_drop_percent: None,
            last_price: Some(price),
            last_update: Some(now),
            initialized: true,
            initialization_time: Some(now),
            session_started_at: Some(now),
        }
    }

    /// Deepest level fired in the current session
    pub fn deepest_level(&self) -> Option<u32> {
        let from_set = self.triggered_levels.iter().next_back().copied();
        match (from_set, self.last_signal_level) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_triggered(&self, level: u32) -> bool {
        self.triggered_levels.contains(&level)
    }

    /// Record a fired signal
    pub fn mark_signal(&mut self, level: u32, price: f64, drop_percent: f64, now: DateTime<Utc>) {
        self.triggered_levels.insert(level);
        self.last_signal_level = Some(level);
        self.last_signal_time = Some(now);
        self.last_signal_price = Some(price);
        self.last_signal_drop_percent = Some(drop_percent);
    }

    /// Percent change of `price` versus the current local max
    pub fn change_from_max(&self, price: f64) -> Option<f64> {
        self.local_max
            .filter(|max| *max > 0.0)
            .map(|max| (price - max) / max * 100.0)
    }

    /// Merge a copy read back from durable storage.
    ///
    /// Only session identity and the signal bookkeeping decide the result:
    /// a newer session on disk wins outright, the same session has its
    /// triggered levels unioned and keeps the most recent signal, and an
    /// older disk copy never overwrites memory.
    pub fn merge_persisted(&mut self, disk: PairState) -> MergeOutcome {
        if disk.session_started_at > self.session_started_at {
            *self = disk;
            return MergeOutcome::Adopted;
        }
        if disk.session_started_at < self.session_started_at {
            return MergeOutcome::Kept;
        }

        self.triggered_levels.extend(disk.triggered_levels.iter().copied());
        if disk.last_signal_time > self.last_signal_time {
            self.last_signal_level = disk.last_signal_level;
            self.last_signal_time = disk.last_signal_time;
            self.last_signal_price = disk.last_signal_price;
            self.last_signal_drop_percent = disk.last_signal_drop_percent;
        }
        self.local_min = match (self.local_min, disk.local_min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        MergeOutcome::Merged
    }
}
