//! Storage abstraction for published teambot keys.
//!
//! Trait-based abstraction for persisting the canonical record per (team,
//! bot, application, generation). The trait is synchronous (no async) to
//! maintain a clean synchronous API design.
//!
//! The one operation that matters for correctness is
//! [`Storage::insert_key`]: it must be atomic insert-if-absent, because that
//! is where concurrent publishers from different members converge.
//! [`Storage::replace_key`] is its counterpart for re-signed records: a
//! compare-and-swap, so two members re-signing at once replace the stale
//! record exactly once.

mod chaotic;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};
pub use teambot_core::StorageError;
use teambot_core::{Application, KeyRequest, PukGeneration, TeamId, TeambotKeyGeneration, UserId};

pub use self::redb::RedbStorage;

/// Identifies one stored teambot key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    /// Team the key belongs to
    pub team_id: TeamId,
    /// The bot the key is for
    pub uid: UserId,
    /// Key space
    pub application: Application,
    /// Key generation
    pub generation: TeambotKeyGeneration,
}

impl From<&KeyRequest> for RecordId {
    fn from(request: &KeyRequest) -> Self {
        Self {
            team_id: request.team_id,
            uid: request.uid,
            application: request.application,
            generation: request.generation,
        }
    }
}

/// The canonical published record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTeambotKey {
    /// Base64 sealed seed
    pub ciphertext: String,
    /// Base64 signed metadata
    pub signature: String,
    /// Bot encryption key generation the seed was sealed to
    pub puk_generation: PukGeneration,
}

/// Storage abstraction for published keys
///
/// Must be Clone (shared between the registry and its observers), Send + Sync
/// (thread-safe), and synchronous (no async methods). Implementations
/// typically share internal state via Arc, so clones access the same
/// underlying storage.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned (a thread panicked while holding a lock). Acceptable for
/// test/simulation code, but production implementations should handle poisoned
/// mutexes gracefully.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Load the record for `id`.
    ///
    /// Returns `None` if nothing was published.
    fn load_key(&self, id: &RecordId) -> Result<Option<StoredTeambotKey>, StorageError>;

    /// Store `key` unless a record for `id` already exists.
    ///
    /// # Invariants
    ///
    /// - Atomic: of any number of concurrent inserts for one `id`, exactly
    ///   one returns `true`
    /// - Post: an existing record is never modified
    fn insert_key(&self, id: &RecordId, key: &StoredTeambotKey) -> Result<bool, StorageError>;

    /// Replace the record for `id` with `key` if it is still `expected`.
    ///
    /// # Invariants
    ///
    /// - Atomic: of any number of concurrent replaces of one `expected`
    ///   record, at most one returns `true`
    /// - Returns `false` if the record is missing or differs from `expected`
    fn replace_key(
        &self,
        id: &RecordId,
        expected: &StoredTeambotKey,
        key: &StoredTeambotKey,
    ) -> Result<bool, StorageError>;

    /// Remove the record for `id`. Returns whether one existed.
    fn delete_key(&self, id: &RecordId) -> Result<bool, StorageError>;
}
