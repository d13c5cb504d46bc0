//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! All state survives server restarts. Redb serializes write transactions,
//! which makes the check-then-insert in [`Storage::insert_key`] and the
//! compare-and-swap in [`Storage::replace_key`] atomic.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};

use super::{RecordId, Storage, StorageError, StoredTeambotKey};

/// Table: teambot_keys
/// Key: (team_id: u128, uid: u128, application tag: u8, generation: u64) as
/// big-endian bytes [41 bytes]
/// Value: CBOR-encoded `StoredTeambotKey`
const TEAMBOT_KEYS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("teambot_keys");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the key table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(TEAMBOT_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn load_key(&self, id: &RecordId) -> Result<Option<StoredTeambotKey>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(TEAMBOT_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

        let key = encode_record_key(id);
        match table.get(key.as_slice()).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => {
                let record = ciborium::from_reader(value.value())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(record))
            },
            None => Ok(None),
        }
    }

    fn insert_key(&self, id: &RecordId, key: &StoredTeambotKey) -> Result<bool, StorageError> {
        let mut value = Vec::new();
        ciborium::into_writer(key, &mut value)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let record_key = encode_record_key(id);

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let inserted;
        {
            let mut table =
                txn.open_table(TEAMBOT_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

            let exists = table
                .get(record_key.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_some();

            inserted = !exists;
            if inserted {
                table
                    .insert(record_key.as_slice(), value.as_slice())
                    .map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(inserted)
    }

    fn replace_key(
        &self,
        id: &RecordId,
        expected: &StoredTeambotKey,
        key: &StoredTeambotKey,
    ) -> Result<bool, StorageError> {
        let mut value = Vec::new();
        ciborium::into_writer(key, &mut value)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let record_key = encode_record_key(id);

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let replaced;
        {
            let mut table =
                txn.open_table(TEAMBOT_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

            let current: Option<StoredTeambotKey> = match table
                .get(record_key.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?
            {
                Some(stored) => Some(
                    ciborium::from_reader(stored.value())
                        .map_err(|e| StorageError::Serialization(e.to_string()))?,
                ),
                None => None,
            };

            replaced = current.as_ref() == Some(expected);
            if replaced {
                table
                    .insert(record_key.as_slice(), value.as_slice())
                    .map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(replaced)
    }

    fn delete_key(&self, id: &RecordId) -> Result<bool, StorageError> {
        let record_key = encode_record_key(id);

        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        let existed;
        {
            let mut table =
                txn.open_table(TEAMBOT_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;
            existed = table
                .remove(record_key.as_slice())
                .map_err(|e| StorageError::Io(e.to_string()))?
                .is_some();
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(existed)
    }
}

/// Encode a record id as big-endian bytes so keys sort by team, bot,
/// application, then generation.
fn encode_record_key(id: &RecordId) -> [u8; 41] {
    let mut key = [0u8; 41];
    key[0..16].copy_from_slice(&id.team_id.to_be_bytes());
    key[16..32].copy_from_slice(&id.uid.to_be_bytes());
    key[32] = id.application.tag();
    key[33..41].copy_from_slice(&id.generation.to_be_bytes());
    key
}
