//! Simulated environment with a manual clock and seeded randomness.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use teambot_core::Environment;

/// Unix time the simulated clock starts at (2024-01-01T00:00:00Z).
pub const SIM_EPOCH_SECS: u64 = 1_704_067_200;

/// Deterministic [`Environment`].
///
/// Time only moves when a test calls [`SimEnv::advance`]. Randomness comes
/// from a ChaCha20 stream, so a seed reproduces every ephemeral key and nonce
/// as long as calls happen in the same order. Clones share clock and RNG.
#[derive(Clone)]
pub struct SimEnv {
    now_secs: Arc<AtomicU64>,
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            now_secs: Arc::new(AtomicU64::new(SIM_EPOCH_SECS)),
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now_secs.fetch_add(by.as_secs(), Ordering::SeqCst);
    }

    /// Set the clock to an absolute Unix time.
    pub fn set_time(&self, secs: u64) {
        self.now_secs.store(secs, Ordering::SeqCst);
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn wall_clock_secs(&self) -> u64 {
        self.now_secs.load(Ordering::SeqCst)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("SimEnv RNG mutex poisoned").fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(9);
        let b = SimEnv::with_seed(9);
        assert_eq!(a.random_array::<32>(), b.random_array::<32>());
    }

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::new();
        let clone = env.clone();

        env.advance(Duration::from_secs(90));

        assert_eq!(clone.wall_clock_secs(), SIM_EPOCH_SECS + 90);
    }
}
