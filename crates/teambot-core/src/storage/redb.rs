//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Cached keys and freshness records survive process restarts.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};

use super::{KeyValueStore, StorageError};

/// Table: entries
/// Key: opaque string key chosen by the caller
/// Value: opaque bytes (already encrypted when wrapped in `EncryptedStore`)
const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("teambot_entries");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the entries table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(ENTRIES).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(ENTRIES).map_err(|e| StorageError::Io(e.to_string()))?;

        let value = table.get(key).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(ENTRIES).map_err(|e| StorageError::Io(e.to_string()))?;
            table.insert(key, value).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(ENTRIES).map_err(|e| StorageError::Io(e.to_string()))?;
            table.remove(key).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let removed;
        {
            let mut table =
                txn.open_table(ENTRIES).map_err(|e| StorageError::Io(e.to_string()))?;

            let mut doomed = Vec::new();
            for result in table.range(prefix..).map_err(|e| StorageError::Io(e.to_string()))? {
                let (key, _) = result.map_err(|e| StorageError::Io(e.to_string()))?;
                let key = key.value();
                if !key.starts_with(prefix) {
                    break;
                }
                doomed.push(key.to_string());
            }

            for key in &doomed {
                table.remove(key.as_str()).map_err(|e| StorageError::Io(e.to_string()))?;
            }
            removed = doomed.len();
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(removed)
    }
}
