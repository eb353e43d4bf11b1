//! Response cache for resolved records.
//!
//! A short-TTL map in front of the record store: entries keep the record
//! snapshot and when it was captured, staleness is judged lazily by the
//! reader, and a periodic sweep evicts what expired. Record mutations do
//! not invalidate entries; a change becomes visible once the TTL lapses.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

use log::debug;

use crate::store::Record;

/// How long a cached record may serve answers.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Interval for cleaning up expired cache entries.
pub const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// A cached record snapshot.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The record as it was read from the store.
    pub record: Record,
    /// When this entry was captured.
    pub captured_at: Instant,
}

impl CacheEntry {
    /// Whether this entry is still within its TTL.
    pub fn is_fresh(&self) -> bool {
        self.captured_at.elapsed() < CACHE_TTL
    }

    /// Freshness judged against an explicit clock reading.
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now.duration_since(self.captured_at) < CACHE_TTL
    }
}

/// Cache of resolved records, keyed by queried name.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl ResponseCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached entry for a name, fresh or not.
    ///
    /// Staleness is the reader's concern: the entry carries its capture
    /// time and `CacheEntry::is_fresh` applies the TTL.
    ///
    /// # Arguments
    /// * `name` - The queried name.
    ///
    /// # Returns
    /// An `Option` containing a copy of the cached entry.
    pub fn get(&self, name: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap();
        entries.get(name).cloned()
    }

    /// Insert or overwrite the entry for a name with a fresh timestamp.
    ///
    /// # Arguments
    /// * `name` - The queried name.
    /// * `record` - The record read from the store.
    pub fn put(&self, name: &str, record: Record) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            name.to_string(),
            CacheEntry {
                record,
                captured_at: Instant::now(),
            },
        );
    }

    /// Remove expired entries from the cache.
    pub fn cleanup(&self) {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, entry| entry.is_fresh());
        debug!("Cache cleanup completed");
    }

    /// Number of entries, fresh or stale.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Rewrite an entry's capture time to `age` ago.
    #[cfg(test)]
    pub(crate) fn backdate(&self, name: &str, age: Duration) {
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(name) {
            entry.captured_at = Instant::now().checked_sub(age).unwrap_or_else(Instant::now);
        }
    }
}
