//! Cache entry storage.
//!
//! A keyed map of [`CacheEntry`] values behind a single lock. Entries are
//! only ever written whole and removed by explicit invalidation; expiry is
//! computed lazily on read, so there is no eviction sweep.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tracing::{debug, info};

use super::entry::CacheEntry;
use super::lock::{rw_read, rw_write};
use super::policy::DataCategory;

const SOURCE: &str = "cache::store";

/// In-memory store for cached upstream payloads.
pub struct CacheStore<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> CacheStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the entry for `key`, if any. Freshness is evaluated by the
    /// caller against the returned entry's clock-derived state.
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        rw_read(&self.entries, SOURCE, "get").get(key).cloned()
    }

    /// Store a freshly fetched value, overwriting any previous entry.
    pub fn put(
        &self,
        key: &str,
        value: T,
        fresh_ttl: Duration,
        stale_ttl: Duration,
        category: DataCategory,
    ) {
        let entry = CacheEntry::new(value, fresh_ttl, stale_ttl, category);
        rw_write(&self.entries, SOURCE, "put").insert(key.to_string(), entry);
        debug!(key, %category, "stored cache entry");
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = rw_write(&self.entries, SOURCE, "invalidate")
            .remove(key)
            .is_some();
        if removed {
            info!(key, "invalidated cache entry");
        }
        removed
    }

    /// Remove every entry whose key contains `pattern`. Returns the count.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "invalidate_pattern");
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        let removed = before - entries.len();
        if removed > 0 {
            info!(pattern, removed, "invalidated cache entries by pattern");
        }
        removed
    }

    /// Remove all entries. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        let count = entries.len();
        entries.clear();
        info!(count, "cleared cache");
        count
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
