//! Error types for teambot key distribution.
//!
//! Callers care about one distinction above all: whether waiting can help.
//! [`TeambotError::is_transient`] covers keys nobody has published yet and
//! infrastructure hiccups; [`TeambotError::is_permanent`] covers stale
//! signatures past their window and integrity failures.

use teambot_crypto::CryptoError;
use thiserror::Error;

use crate::{
    storage::StorageError,
    transport::ServerStatus,
    types::{Application, TeamId, TeambotKeyGeneration, UserId},
};

/// Errors from member-side and bot-side keyer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeambotError {
    /// No member has published this generation yet
    #[error("teambot key not found: team {team_id:032x}, {application} generation {generation}")]
    KeyNotFound {
        /// Team the key was requested for
        team_id: TeamId,
        /// Key space
        application: Application,
        /// Requested generation
        generation: TeambotKeyGeneration,
    },

    /// Key is signed by a superseded team key and its window has closed
    #[error(
        "teambot key signed by stale team key: team {team_id:032x}, {application} generation \
         {generation}, first seen at {first_seen_secs}"
    )]
    WrongKidExpired {
        /// Team the key belongs to
        team_id: TeamId,
        /// Key space
        application: Application,
        /// Generation that is no longer usable
        generation: TeambotKeyGeneration,
        /// When the stale signature was first observed (Unix seconds)
        first_seen_secs: u64,
    },

    /// Boxed key does not unbox to the signed kid, or the box was altered
    #[error("teambot key integrity failure: {reason}")]
    IntegrityFailure {
        /// What failed to match
        reason: String,
    },

    /// Coordinating server rejected the request
    #[error("server rejected request with status {status:?}: {message}")]
    Server {
        /// Server status class
        status: ServerStatus,
        /// Server-provided description
        message: String,
    },

    /// Bot has no encryption key to seal the seed to
    #[error("user {uid:032x} has no encryption key")]
    NoEncryptionKey {
        /// The bot that could not be encrypted to
        uid: UserId,
    },

    /// Operation needs a capability this identity does not have
    #[error("not permitted: {0}")]
    NotPermitted(String),

    /// Team state could not be loaded
    #[error("team load failed: {0}")]
    Team(String),

    /// Keyring lookup or sync failed
    #[error("keyring error: {0}")]
    Keyring(String),

    /// Network or RPC failure reaching the server
    #[error("transport error: {0}")]
    Transport(String),

    /// Persistent store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Signature or encoding failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl TeambotError {
    /// Returns true if this error may succeed on retry.
    ///
    /// A missing key becomes available once a member publishes it; transport
    /// errors are network conditions.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. } | Self::Transport(_))
    }

    /// Returns true if retrying with the same data cannot succeed.
    ///
    /// A closed freshness window needs a member to re-sign; an integrity
    /// failure means the record itself is bad.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::WrongKidExpired { .. } | Self::IntegrityFailure { .. })
    }

    /// Returns true if the server flagged a publish race worth retrying.
    pub fn is_publish_race(&self) -> bool {
        matches!(self, Self::Server { status, .. } if status.is_publish_race())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_transient() {
        let err = TeambotError::KeyNotFound {
            team_id: 1,
            application: Application::Chat,
            generation: 4,
        };
        assert!(err.is_transient());
        assert!(!err.is_permanent());
    }

    #[test]
    fn expired_window_is_permanent() {
        let err = TeambotError::WrongKidExpired {
            team_id: 1,
            application: Application::Chat,
            generation: 4,
            first_seen_secs: 100,
        };
        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }

    #[test]
    fn integrity_failure_is_permanent() {
        let err = TeambotError::IntegrityFailure { reason: "kid mismatch".to_string() };
        assert!(err.is_permanent());
    }

    #[test]
    fn race_statuses_are_detected() {
        let race = TeambotError::Server {
            status: ServerStatus::SigWrongKey,
            message: "wrong key".to_string(),
        };
        let other =
            TeambotError::Server { status: ServerStatus::Other(500), message: "boom".to_string() };

        assert!(race.is_publish_race());
        assert!(!other.is_publish_race());
        assert!(!other.is_transient());
    }

    #[test]
    fn error_display() {
        let err = TeambotError::KeyNotFound {
            team_id: 0xAB,
            application: Application::KvStore,
            generation: 2,
        };
        assert_eq!(
            err.to_string(),
            "teambot key not found: team 000000000000000000000000000000ab, kvstore generation 2"
        );
    }
}
