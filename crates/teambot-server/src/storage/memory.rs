#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use super::{RecordId, Storage, StorageError, StoredTeambotKey};

/// In-memory storage implementation for testing and simulation
///
/// All state is wrapped in Arc<Mutex<>> to allow Clone and concurrent access.
/// Insert-if-absent happens under one lock acquisition. Uses
/// `lock().expect()` which will panic if the mutex is poisoned - acceptable
/// for test code.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    keys: Arc<Mutex<HashMap<RecordId, StoredTeambotKey>>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). This is acceptable for test/simulation code.
    #[allow(clippy::expect_used)]
    pub fn key_count(&self) -> usize {
        self.keys.lock().expect("Mutex poisoned").len()
    }
}

impl Storage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn load_key(&self, id: &RecordId) -> Result<Option<StoredTeambotKey>, StorageError> {
        Ok(self.keys.lock().expect("Mutex poisoned").get(id).cloned())
    }

    #[allow(clippy::expect_used)]
    fn insert_key(&self, id: &RecordId, key: &StoredTeambotKey) -> Result<bool, StorageError> {
        let mut keys = self.keys.lock().expect("Mutex poisoned");
        if keys.contains_key(id) {
            return Ok(false);
        }
        keys.insert(*id, key.clone());
        Ok(true)
    }

    #[allow(clippy::expect_used)]
    fn replace_key(
        &self,
        id: &RecordId,
        expected: &StoredTeambotKey,
        key: &StoredTeambotKey,
    ) -> Result<bool, StorageError> {
        let mut keys = self.keys.lock().expect("Mutex poisoned");
        match keys.get_mut(id) {
            Some(current) if current == expected => {
                *current = key.clone();
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    #[allow(clippy::expect_used)]
    fn delete_key(&self, id: &RecordId) -> Result<bool, StorageError> {
        Ok(self.keys.lock().expect("Mutex poisoned").remove(id).is_some())
    }
}
