//! Per-key async locks.
//!
//! Locks are created on first use and kept for the life of the registry, so
//! memory grows with the number of distinct keys ever locked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held while a key is locked. Dropping it unlocks the key.
pub type KeyGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct KeyedMutex {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `key` is free and returns its guard.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        self.lock_for(key).lock_owned().await
    }

    /// Takes the lock only if nobody holds it.
    pub fn try_lock(&self, key: &str) -> Option<KeyGuard> {
        self.lock_for(key).try_lock_owned().ok()
    }

    pub fn is_locked(&self, key: &str) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .get(key)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of keys that have a lock allocated.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Get-or-insert under the registry lock so concurrent first users share one mutex.
    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(key) {
            return lock.clone();
        }
        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(key.to_string(), lock.clone());
        lock
    }
}
