//! Keyer configuration.

use std::time::Duration;

use serde::Deserialize;

/// Default freshness window for keys signed by a superseded team key (24h).
pub const DEFAULT_WRONG_KID_GRACE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default bound on publish attempts when the server reports a race.
pub const DEFAULT_MAX_PUBLISH_ATTEMPTS: u32 = 5;

/// Default capacity of each volatile cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Configuration shared by the member and bot keyers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeyerConfig {
    /// How long a key signed by a superseded team signing key stays usable,
    /// measured from the first time the bot noticed.
    pub wrong_kid_grace: Duration,

    /// Total attempts for one publish when the server reports a race
    /// condition. Must be at least 1.
    pub max_publish_attempts: u32,

    /// Maximum entries in each in-process cache before LRU eviction.
    pub cache_capacity: usize,
}

impl Default for KeyerConfig {
    fn default() -> Self {
        Self {
            wrong_kid_grace: DEFAULT_WRONG_KID_GRACE,
            max_publish_attempts: DEFAULT_MAX_PUBLISH_ATTEMPTS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}
