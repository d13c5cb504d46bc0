//! Environment abstraction for deterministic testing.
//!
//! Decouples keyer logic from system resources (time, randomness). The
//! freshness window is defined in wall-clock time, so tests drive a manual
//! clock to exercise window expiry without sleeping.

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Seconds since the Unix epoch.
    ///
    /// Persisted freshness records compare against this value across process
    /// restarts, so it must be wall-clock time rather than a monotonic
    /// instant.
    fn wall_clock_secs(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Returns `N` random bytes.
    ///
    /// Convenience wrapper for nonces and ephemeral secrets.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}
