//! Key caches.
//!
//! Two tiers on the bot side: a bounded in-process LRU in front of the
//! persistent store. The bot keyer hands this cache an
//! [`EncryptedStore`](crate::storage::EncryptedStore), so persisted seeds are
//! sealed at rest. Members only keep the volatile tier, and only for
//! metadata; the seed is cheap to re-derive.
//!
//! Both tiers are bound to the logged-in identity and are purged on logout and
//! on local storage reset.

#![allow(clippy::disallowed_types, reason = "Cache mutex is never held across an await")]

use std::{hash::Hash, num::NonZeroUsize, sync::Mutex};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use teambot_crypto::Seed;
use zeroize::Zeroize;

use crate::{
    error::TeambotError,
    storage::{KeyValueStore, StorageError},
    types::{Application, TeamId, TeambotKey, TeambotKeyGeneration, TeambotKeyMetadata, UserId},
};

/// Storage prefix for persisted teambot keys.
pub const KEY_CACHE_PREFIX: &str = "teambot-key:";

/// Bounded, thread-safe LRU map.
pub struct VolatileCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> VolatileCache<K, V> {
    /// Cache holding at most `capacity` entries. A capacity of zero is
    /// treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { entries: Mutex::new(LruCache::new(capacity)) }
    }

    /// Cached value, refreshing its recency.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().expect("Mutex poisoned").get(key).cloned()
    }

    /// Insert, evicting the least recently used entry if full.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn put(&self, key: K, value: V) {
        self.entries.lock().expect("Mutex poisoned").put(key, value);
    }

    /// Remove one entry.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().expect("Mutex poisoned").pop(key)
    }

    /// Remove every entry whose key matches `predicate`. Returns how many
    /// were removed.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn remove_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut entries = self.entries.lock().expect("Mutex poisoned");
        let doomed: Vec<K> =
            entries.iter().filter(|(key, _)| predicate(key)).map(|(key, _)| key.clone()).collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    /// Drop everything.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn clear(&self) {
        self.entries.lock().expect("Mutex poisoned").clear();
    }

    /// Number of cached entries.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("Mutex poisoned").len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identifies one cached teambot key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The bot the key belongs to
    pub bot: UserId,
    /// Team
    pub team_id: TeamId,
    /// Key space
    pub application: Application,
    /// Key generation
    pub generation: TeambotKeyGeneration,
}

impl CacheKey {
    /// Key in the persistent store.
    pub fn storage_key(&self) -> String {
        format!(
            "{KEY_CACHE_PREFIX}{:032x}:{:032x}:{}:{}",
            self.bot, self.team_id, self.application, self.generation
        )
    }

    /// Whether this key is for `team_id`/`application` at `generation`.
    pub fn matches(
        &self,
        team_id: TeamId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> bool {
        self.team_id == team_id && self.application == application && self.generation == generation
    }
}

/// A resolved key and whether its signature was stale when it was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedKey {
    /// The usable key
    pub key: TeambotKey,
    /// Signature was by a superseded team key; the freshness window must be
    /// consulted again on every use
    pub wrong_kid: bool,
}

#[derive(Serialize, Deserialize)]
struct StoredKey {
    seed: Vec<u8>,
    metadata: TeambotKeyMetadata,
    wrong_kid: bool,
}

/// Volatile LRU in front of a persistent store.
pub struct TieredKeyCache<S> {
    volatile: VolatileCache<CacheKey, CachedKey>,
    store: S,
}

impl<S: KeyValueStore> TieredKeyCache<S> {
    /// Cache with a volatile tier of `capacity` entries over `store`.
    pub fn new(store: S, capacity: usize) -> Self {
        Self { volatile: VolatileCache::new(capacity), store }
    }

    /// Look up a key, volatile tier first.
    ///
    /// A persistent entry that fails to decrypt or decode is dropped and
    /// reported as a miss so the key is fetched again.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CachedKey>, TeambotError> {
        if let Some(hit) = self.volatile.get(key) {
            return Ok(Some(hit));
        }

        let storage_key = key.storage_key();
        let bytes = match self.store.get(&storage_key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(StorageError::Decryption(reason)) => {
                tracing::warn!(key = %storage_key, %reason, "Dropping unreadable cache entry");
                self.store.delete(&storage_key)?;
                return Ok(None);
            },
            Err(e) => return Err(e.into()),
        };

        match decode(&bytes) {
            Ok(cached) => {
                self.volatile.put(*key, cached.clone());
                Ok(Some(cached))
            },
            Err(e) => {
                tracing::warn!(key = %storage_key, error = %e, "Dropping undecodable cache entry");
                self.store.delete(&storage_key)?;
                Ok(None)
            },
        }
    }

    /// Store in both tiers.
    pub fn put(&self, key: CacheKey, value: CachedKey) -> Result<(), TeambotError> {
        let mut bytes = encode(&value)?;
        let stored = self.store.put(&key.storage_key(), &bytes);
        bytes.zeroize();
        stored?;

        self.volatile.put(key, value);
        Ok(())
    }

    /// Remove from both tiers.
    pub fn remove(&self, key: &CacheKey) -> Result<(), TeambotError> {
        self.volatile.remove(key);
        self.store.delete(&key.storage_key())?;
        Ok(())
    }

    /// Remove every key for `team_id`/`application` at `generation`.
    pub fn remove_generation(
        &self,
        bot: UserId,
        team_id: TeamId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> Result<(), TeambotError> {
        self.remove(&CacheKey { bot, team_id, application, generation })
    }

    /// Drop both tiers entirely. Returns the number of persisted entries
    /// removed.
    pub fn clear(&self) -> Result<usize, TeambotError> {
        self.volatile.clear();
        Ok(self.store.delete_prefix(KEY_CACHE_PREFIX)?)
    }

    /// Drop the in-process tier only.
    pub fn clear_volatile(&self) {
        self.volatile.clear();
    }

    /// Entries in the in-process tier.
    pub fn volatile_len(&self) -> usize {
        self.volatile.len()
    }
}

fn encode(value: &CachedKey) -> Result<Vec<u8>, TeambotError> {
    let mut stored = StoredKey {
        seed: value.key.seed.as_bytes().to_vec(),
        metadata: value.key.metadata.clone(),
        wrong_kid: value.wrong_kid,
    };

    let mut bytes = Vec::with_capacity(160);
    let result = ciborium::into_writer(&stored, &mut bytes)
        .map_err(|e| TeambotError::Serialization(e.to_string()));
    stored.seed.zeroize();
    result?;
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<CachedKey, TeambotError> {
    let mut stored: StoredKey =
        ciborium::from_reader(bytes).map_err(|e| TeambotError::Serialization(e.to_string()))?;
    let seed = Seed::try_from_slice(&stored.seed);
    stored.seed.zeroize();

    Ok(CachedKey {
        key: TeambotKey { seed: seed?, metadata: stored.metadata },
        wrong_kid: stored.wrong_kid,
    })
}
