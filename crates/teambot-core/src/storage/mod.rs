//! Persistent key-value storage for the bot-side cache.
//!
//! Trait-based abstraction over an opaque string-keyed byte store. The trait
//! is synchronous (no async): local storage calls are short and the keyers
//! never hold a store call across a network round trip.
//!
//! Encryption at rest is the store's concern. [`EncryptedStore`] adds it on top
//! of any other implementation.

mod encrypted;
mod error;
mod memory;
mod redb;

pub use encrypted::EncryptedStore;
pub use error::StorageError;
pub use memory::MemoryStore;

pub use self::redb::RedbStore;

/// Opaque key-value store.
///
/// Must be Clone (shared between the cache and the freshness tracker), Send +
/// Sync (thread-safe), and synchronous. Implementations typically share
/// internal state via Arc, so clones access the same underlying storage.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    /// Value stored under `key`, or `None`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `key`, overwriting any previous value.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every key starting with `prefix`.
    ///
    /// Returns the number of keys removed.
    fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError>;
}
