//! Per-key async locks.
//!
//! Serializes the check-cache, derive, publish sequence for one key within
//! this process. Unrelated keys never contend. Entries hold only a weak
//! reference, so a lock disappears from the table once its last holder is
//! gone.

#![allow(clippy::disallowed_types, reason = "Table mutex is never held across an await")]

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, Weak},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of lazily created async mutexes keyed by `K`.
pub struct LockTable<K> {
    locks: Mutex<HashMap<K, Weak<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> LockTable<K> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    /// Acquire the lock for `key`, waiting for any current holder.
    ///
    /// # Panics
    ///
    /// Panics if the table mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().expect("Mutex poisoned");
            locks.retain(|_, weak| weak.strong_count() > 0);

            if let Some(existing) = locks.get(&key).and_then(Weak::upgrade) {
                existing
            } else {
                let fresh = Arc::new(AsyncMutex::new(()));
                locks.insert(key, Arc::downgrade(&fresh));
                fresh
            }
        };

        mutex.lock_owned().await
    }

    /// Number of keys with a live lock.
    ///
    /// # Panics
    ///
    /// Panics if the table mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn live_keys(&self) -> usize {
        let locks = self.locks.lock().expect("Mutex poisoned");
        locks.values().filter(|weak| weak.strong_count() > 0).count()
    }
}

impl<K: Eq + Hash + Clone> Default for LockTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let table = Arc::new(LockTable::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = Arc::clone(&table);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = table.lock(7u64).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let table = LockTable::new();

        let _a = table.lock(1u64).await;
        let b = tokio::time::timeout(Duration::from_millis(100), table.lock(2u64)).await;

        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let table = LockTable::new();
        {
            let _guard = table.lock(1u64).await;
            assert_eq!(table.live_keys(), 1);
        }
        assert_eq!(table.live_keys(), 0);
    }
}
