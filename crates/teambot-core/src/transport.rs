//! Coordinating server interface.
//!
//! The keyers talk to the server through [`KeyServer`]: fetch a boxed key,
//! publish one, and (tests only) delete one. The server is the single place
//! where concurrent publishers converge; the first valid publish for a
//! (team, application, generation) wins and later ones are reported as
//! [`PublishOutcome::AlreadyExists`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::TeambotError,
    types::{Application, TeamId, TeambotKeyGeneration, UserId},
};

/// Server status classes the keyers understand.
///
/// Numeric codes match the server's wire statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerStatus {
    /// Record does not exist
    NotFound,
    /// Signature did not verify or did not match the request
    SigCannotVerify,
    /// Signature was made with a key that is not the team's current one
    SigWrongKey,
    /// Signed against an outdated view of the team's log
    SigOldSeqno,
    /// A key for this generation already exists
    GenerationExists,
    /// Seed was sealed to an outdated bot encryption key
    OldBoxedGeneration,
    /// Generation is not one the team has reached
    BadGeneration,
    /// Team is unknown to the server
    TeamNotFound,
    /// Caller may not write this record
    TeamWritePermDenied,
    /// Any other status
    Other(u32),
}

impl ServerStatus {
    /// Wire status code.
    pub fn code(self) -> u32 {
        match self {
            Self::NotFound => 205,
            Self::SigCannotVerify => 1002,
            Self::SigWrongKey => 1008,
            Self::SigOldSeqno => 1010,
            Self::GenerationExists => 3800,
            Self::OldBoxedGeneration => 3801,
            Self::BadGeneration => 3802,
            Self::TeamNotFound => 2614,
            Self::TeamWritePermDenied => 2625,
            Self::Other(code) => code,
        }
    }

    /// Parse a wire status code.
    pub fn from_code(code: u32) -> Self {
        match code {
            205 => Self::NotFound,
            1002 => Self::SigCannotVerify,
            1008 => Self::SigWrongKey,
            1010 => Self::SigOldSeqno,
            3800 => Self::GenerationExists,
            3801 => Self::OldBoxedGeneration,
            3802 => Self::BadGeneration,
            2614 => Self::TeamNotFound,
            2625 => Self::TeamWritePermDenied,
            other => Self::Other(other),
        }
    }

    /// True for statuses caused by another writer advancing team or bot
    /// state between our load and our publish. Retrying against fresh state
    /// resolves them.
    pub fn is_publish_race(self) -> bool {
        matches!(
            self,
            Self::SigWrongKey | Self::SigOldSeqno | Self::OldBoxedGeneration | Self::BadGeneration
        )
    }
}

/// Identifies one teambot key on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyRequest {
    /// Team the key belongs to
    pub team_id: TeamId,
    /// The bot the key is for
    pub uid: UserId,
    /// Key space
    pub application: Application,
    /// Key generation
    pub generation: TeambotKeyGeneration,
    /// Always false for teambot keys; kept for wire compatibility with the
    /// shared key endpoint
    pub is_ephemeral: bool,
}

impl KeyRequest {
    /// Request for a non-ephemeral teambot key.
    pub fn new(
        team_id: TeamId,
        uid: UserId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> Self {
        Self { team_id, uid, application, generation, is_ephemeral: false }
    }
}

/// What travels over the wire: the sealed seed and the signed metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxedKeyEnvelope {
    /// Base64 sealed box containing the seed
    pub ciphertext: String,
    /// Base64 signed metadata
    pub signature: String,
}

/// Successful publish outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// This publish created the canonical record
    Created,
    /// Another publisher got there first
    AlreadyExists,
}

/// Authenticated request/response channel to the coordinating server.
///
/// Implementations map server statuses to [`TeambotError::Server`] and
/// network failures to [`TeambotError::Transport`]. A "generation exists"
/// answer to a publish may come back either as
/// `Ok(PublishOutcome::AlreadyExists)` or as that status; the member keyer
/// treats both as success.
#[async_trait]
pub trait KeyServer: Send + Sync {
    /// Fetch the boxed key, or `None` if nobody has published it.
    async fn fetch(&self, request: &KeyRequest) -> Result<Option<BoxedKeyEnvelope>, TeambotError>;

    /// Publish a boxed key.
    async fn publish(
        &self,
        request: &KeyRequest,
        envelope: &BoxedKeyEnvelope,
    ) -> Result<PublishOutcome, TeambotError>;

    /// Delete a published key. Only honoured by test deployments.
    async fn delete_for_test(&self, request: &KeyRequest) -> Result<(), TeambotError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_roundtrip() {
        for code in [205, 1002, 1008, 1010, 2614, 2625, 3800, 3801, 3802, 218] {
            assert_eq!(ServerStatus::from_code(code).code(), code);
        }
    }

    #[test]
    fn generation_exists_is_not_a_race() {
        assert!(!ServerStatus::GenerationExists.is_publish_race());
        assert!(ServerStatus::BadGeneration.is_publish_race());
        assert!(ServerStatus::OldBoxedGeneration.is_publish_race());
        assert!(ServerStatus::SigOldSeqno.is_publish_race());
    }

    #[test]
    fn requests_are_never_ephemeral() {
        let request = KeyRequest::new(1, 2, Application::Chat, 3);
        assert!(!request.is_ephemeral);
    }
}
