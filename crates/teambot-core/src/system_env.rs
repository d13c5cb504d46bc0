//! Production Environment implementation using system time and RNG.

use crate::env::Environment;

/// Production environment using the system clock and cryptographic RNG.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness
/// (e.g., /dev/urandom on Linux, `BCryptGenRandom` on Windows). Sealed-box
/// ephemeral secrets and nonces come from here.
///
/// # Panics
///
/// Panics if the OS RNG fails. Continuing without randomness would reuse
/// ephemeral secrets across sealed boxes.
#[derive(Clone, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_secs()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
