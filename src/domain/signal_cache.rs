//! Sent-Signal Cache
//!
//! Two-window TTL cache used by the notification sink as a last line of
//! duplicate suppression:
//! - (pair, level) keys: short window, guards rapid re-delivery
//! - rendered message text: long window, guards identical re-sends even if
//!   upstream state was lost

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Why a message was blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    SameKey,
    SameText,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(ttl: Duration) -> Self {
        Self {
            inserted_at: Instant::now(),
            ttl,
        }
    }

    fn is_valid(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

/// Map of keys to expiry, bounded in size
#[derive(Debug)]
struct TtlSet<K> {
    entries: HashMap<K, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl<K: Eq + Hash + Clone> TtlSet<K> {
    fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries,
        }
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.get(key).is_some_and(CacheEntry::is_valid)
    }

    fn insert(&mut self, key: K) {
        if self.entries.len() >= self.max_entries {
            self.cleanup();
        }
        if self.entries.len() >= self.max_entries {
            self.remove_oldest();
        }
        self.entries.insert(key, CacheEntry::new(self.ttl));
    }

    fn cleanup(&mut self) {
        self.entries.retain(|_, entry| entry.is_valid());
    }

    fn remove_oldest(&mut self) {
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone())
        {
            self.entries.remove(&oldest);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Duplicate-suppression cache for outgoing signals
#[derive(Debug)]
pub struct SignalCache {
    by_key: TtlSet<(String, u32)>,
    by_text: TtlSet<String>,
}

impl SignalCache {
    /// Default key window (10 minutes)
    pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(600);
    /// Default text window (24 hours)
    pub const DEFAULT_TEXT_TTL: Duration = Duration::from_secs(24 * 3600);
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

    pub fn new() -> Self {
        Self::with_config(
            Self::DEFAULT_KEY_TTL,
            Self::DEFAULT_TEXT_TTL,
            Self::DEFAULT_MAX_ENTRIES,
        )
    }

    pub fn with_config(key_ttl: Duration, text_ttl: Duration, max_entries: usize) -> Self {
        Self {
            by_key: TtlSet::new(key_ttl, max_entries),
            by_text: TtlSet::new(text_ttl, max_entries),
        }
    }

    /// Whether sending this (key, text) now would be a duplicate
    pub fn check(&self, key: &(String, u32), text: &str) -> Option<DuplicateReason> {
        if self.by_key.contains(key) {
            return Some(DuplicateReason::SameKey);
        }
        if self.by_text.contains(&text.to_string()) {
            return Some(DuplicateReason::SameText);
        }
        None
    }

    /// Remember a delivered message
    pub fn record(&mut self, key: (String, u32), text: String) {
        self.by_key.insert(key);
        self.by_text.insert(text);
    }

    /// Drop expired entries
    pub fn cleanup(&mut self) {
        self.by_key.cleanup();
        self.by_text.cleanup();
    }

    /// Entries held (including expired)
    pub fn len(&self) -> usize {
        self.by_key.len() + self.by_text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SignalCache {
    fn default() -> Self {
        Self::new()
    }
}
