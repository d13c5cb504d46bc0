//! Chaotic storage wrapper for fault injection testing
//!
//! Randomly fails operations so the registry's error paths get exercised.
//! A failed insert never partially applies: the inner store is only reached
//! when the dice allow it.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use super::{RecordId, Storage, StorageError, StoredTeambotKey};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but fails operations
/// with probability `failure_rate`. Clones share the RNG, so the failure
/// sequence is reproducible for a given seed and call order.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    injected: Arc<Mutex<usize>>,
}

/// Linear congruential generator; deterministic for a given seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        #[allow(clippy::cast_precision_loss)]
        let value = (self.state as f64) / (M as f64);
        value
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner` with the default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x7EA4_B075_0000_0001)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng { state: seed })),
            injected: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying storage, for checking invariants after chaos.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// How many operations were failed on purpose.
    pub fn injected_failures(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.injected.lock().expect("injected mutex poisoned")
    }

    fn roll(&self) -> Result<(), StorageError> {
        #[allow(clippy::expect_used)]
        let fail = self.rng.lock().expect("ChaoticRng mutex poisoned").next() < self.failure_rate;
        if fail {
            #[allow(clippy::expect_used)]
            let mut injected = self.injected.lock().expect("injected mutex poisoned");
            *injected += 1;
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn load_key(&self, id: &RecordId) -> Result<Option<StoredTeambotKey>, StorageError> {
        self.roll()?;
        self.inner.load_key(id)
    }

    fn insert_key(&self, id: &RecordId, key: &StoredTeambotKey) -> Result<bool, StorageError> {
        self.roll()?;
        self.inner.insert_key(id, key)
    }

    fn replace_key(
        &self,
        id: &RecordId,
        expected: &StoredTeambotKey,
        key: &StoredTeambotKey,
    ) -> Result<bool, StorageError> {
        self.roll()?;
        self.inner.replace_key(id, expected, key)
    }

    fn delete_key(&self, id: &RecordId) -> Result<bool, StorageError> {
        self.roll()?;
        self.inner.delete_key(id)
    }
}

#[cfg(test)]
mod tests {
    use teambot_core::Application;

    use super::*;
    use crate::storage::MemoryStorage;

    fn id() -> RecordId {
        RecordId { team_id: 7, uid: 8, application: Application::Chat, generation: 1 }
    }

    fn record() -> StoredTeambotKey {
        StoredTeambotKey {
            ciphertext: "ct".to_string(),
            signature: "sig".to_string(),
            puk_generation: 1,
        }
    }

    #[test]
    fn zero_rate_never_fails() {
        let storage = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        for _ in 0..100 {
            storage.load_key(&id()).unwrap();
        }
        assert_eq!(storage.injected_failures(), 0);
    }

    #[test]
    fn full_rate_always_fails_without_touching_inner() {
        let storage = ChaoticStorage::new(MemoryStorage::new(), 1.0);

        assert!(storage.insert_key(&id(), &record()).is_err());
        assert_eq!(storage.inner().key_count(), 0);
        assert_eq!(storage.injected_failures(), 1);
    }

    #[test]
    fn same_seed_same_failures() {
        let outcomes = |seed| {
            let storage = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, seed);
            (0..32).map(|_| storage.load_key(&id()).is_err()).collect::<Vec<_>>()
        };
        assert_eq!(outcomes(42), outcomes(42));
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between")]
    fn rejects_invalid_rate() {
        let _ = ChaoticStorage::new(MemoryStorage::new(), 1.5);
    }
}
