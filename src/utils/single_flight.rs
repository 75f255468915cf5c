// src/utils/single_flight.rs
//! Per-key async locks.
//!
//! Lazy provisioning paths (new DID key attributes, registry bindings) take
//! the lock for their DID so concurrent first requests for the same DID run
//! one at a time and the later ones observe the cache filled by the first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<LockMap>,
}

/// Holds the lock for one key. The entry is dropped from the map on release
/// when nobody else is waiting for it.
pub struct KeyedGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and returns the guard for `key`.
    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let lock = self
            .map()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        KeyedGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of keys with a holder or a waiter.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.owner.map();
        // Waiters hold their own clone of the entry.
        if locks.get(&self.key).map_or(false, |lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}
