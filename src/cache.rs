//! Time-bounded cache with lazy expiration.
//!
//! Expired entries are treated as absent and dropped on the lookup that
//! finds them. Entries that are never probed again stay until
//! [`TtlCache::purge_expired`] is called; the server does not schedule it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::Clock;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Returns the value for `key` if it has not expired yet.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries();

        let expired = match entries.get(key) {
            Some(entry) if now < entry.expires_at => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    /// Stores `value` until `now + ttl`, replacing any previous entry.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries().insert(key, CacheEntry { value, expires_at });
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries().remove(key).map(|entry| entry.value)
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
