#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use super::{KeyValueStore, StorageError};

/// In-memory store for testing and simulation
///
/// Uses a `BTreeMap` so prefix deletion is a range scan. All state is wrapped
/// in Arc<Mutex<>> to allow Clone and concurrent access. Uses
/// `lock().expect()` which will panic if the mutex is poisoned - acceptable
/// for test code.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty `MemoryStore`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry, simulating a local storage reset.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn nuke(&self) {
        self.inner.lock().expect("Mutex poisoned").clear();
    }
}

impl KeyValueStore for MemoryStore {
    #[allow(clippy::expect_used)]
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").get(key).cloned())
    }

    #[allow(clippy::expect_used)]
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.inner.lock().expect("Mutex poisoned").insert(key.to_string(), value.to_vec());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.lock().expect("Mutex poisoned").remove(key);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let doomed: Vec<String> = inner
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            inner.remove(key);
        }

        Ok(doomed.len())
    }
}
