//! Per-key exclusive locks.
//!
//! The map is guarded by a short-held registry mutex used only for get-or-insert; it is never
//! held while waiting on a key's lock, so different keys do not serialize here. Entries are never
//! removed: the map is bounded by the number of distinct names seen.

use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as KeyMutex, OwnedMutexGuard};

use crate::Key;

/// Held for the whole critical section of one cycle. Dropping it releases the key.
#[derive(Debug)]
pub struct KeyLockGuard {
    key: Key,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLockGuard {
    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        debug!("released lock for {}", self.key);
    }
}

#[derive(Debug, Default)]
pub struct KeyLockRegistry {
    locks: Mutex<HashMap<Key, Arc<KeyMutex<()>>>>,
}

impl KeyLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock object for `key`, created on first sight. Same `Arc` for every caller of the same key.
    fn lock_for(&self, key: &Key) -> Arc<KeyMutex<()>> {
        // The map holds no invariant a panicking holder could break mid-update.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Wait until `key` is free and take it. Cancel-safe: dropping the future abandons the wait.
    pub async fn acquire(&self, key: &Key) -> KeyLockGuard {
        let lock = self.lock_for(key);
        let guard = lock.lock_owned().await;
        KeyLockGuard {
            key: key.clone(),
            _guard: guard,
        }
    }

    /// Take `key` only if nobody holds it.
    pub fn try_acquire(&self, key: &Key) -> Option<KeyLockGuard> {
        let lock = self.lock_for(key);
        let guard = lock.try_lock_owned().ok()?;
        Some(KeyLockGuard {
            key: key.clone(),
            _guard: guard,
        })
    }

    /// Number of distinct keys ever seen.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}
