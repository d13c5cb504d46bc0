//! Freshness window for keys signed by a superseded team key.
//!
//! The first time the bot sees a stale signature on a key it records the
//! time. The key stays usable until the grace period has passed since that
//! first sighting. Records are never reset, so a closed window stays closed
//! for that exact (team, bot, application, generation); a newer generation
//! starts its own window.
//!
//! Records are persisted so a restart cannot reopen a closed window.

use std::time::Duration;

use crate::{
    error::TeambotError,
    storage::KeyValueStore,
    types::{Application, TeamId, TeambotKeyGeneration, UserId},
};

/// Storage prefix for freshness records.
pub const WRONG_KID_PREFIX: &str = "teambot-wrongkid:";

/// Identifies one freshness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrongKidKey {
    /// Team the key belongs to
    pub team_id: TeamId,
    /// The bot holding the key
    pub bot: UserId,
    /// Key space
    pub application: Application,
    /// Key generation
    pub generation: TeambotKeyGeneration,
}

impl WrongKidKey {
    fn storage_key(&self) -> String {
        format!(
            "{WRONG_KID_PREFIX}{:032x}:{:032x}:{}:{}",
            self.bot, self.team_id, self.application, self.generation
        )
    }
}

/// Result of [`WrongKidTracker::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrongKidCheck {
    /// Whether the window is still open
    pub permitted: bool,
    /// When the stale signature was first observed (Unix seconds)
    pub first_seen_secs: u64,
}

/// Persistent first-seen timestamps for stale signatures.
#[derive(Clone)]
pub struct WrongKidTracker<S> {
    store: S,
    grace: Duration,
}

impl<S: KeyValueStore> WrongKidTracker<S> {
    /// Tracker over `store` with the given grace period.
    pub fn new(store: S, grace: Duration) -> Self {
        Self { store, grace }
    }

    /// Configured grace period.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Record a stale signature sighting at `now_secs` and report whether the
    /// window is still open.
    ///
    /// The first call for a key creates the record and is always permitted.
    /// Later calls compare against the original sighting.
    pub fn check_and_record(
        &self,
        key: &WrongKidKey,
        now_secs: u64,
    ) -> Result<WrongKidCheck, TeambotError> {
        let storage_key = key.storage_key();

        let Some(first_seen_secs) = self.first_seen(&storage_key)? else {
            self.store.put(&storage_key, &now_secs.to_be_bytes())?;
            return Ok(WrongKidCheck { permitted: true, first_seen_secs: now_secs });
        };

        let elapsed = now_secs.saturating_sub(first_seen_secs);
        let permitted = elapsed < self.grace.as_secs();
        Ok(WrongKidCheck { permitted, first_seen_secs })
    }

    fn first_seen(&self, storage_key: &str) -> Result<Option<u64>, TeambotError> {
        let Some(bytes) = self.store.get(storage_key)? else {
            return Ok(None);
        };

        let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
            TeambotError::Serialization(format!(
                "freshness record {storage_key} has {} bytes",
                bytes.len()
            ))
        })?;
        Ok(Some(u64::from_be_bytes(raw)))
    }
}
