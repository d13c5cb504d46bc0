//! Team state as seen by the keyers.
//!
//! Sigchain loading and key derivation live elsewhere; the keyers only need a
//! snapshot of the current generation, the current signing key, and which
//! members are restricted bots.

use std::{collections::HashSet, fmt};

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use teambot_crypto::Kid;

use crate::{
    error::TeambotError,
    types::{Application, ApplicationKey, TeamId, TeambotKeyGeneration, UserId},
};

/// Point-in-time view of a team.
#[derive(Clone)]
pub struct TeamSnapshot {
    /// Team identifier
    pub team_id: TeamId,
    /// Current per-team key generation
    pub generation: TeambotKeyGeneration,
    /// Public key of the current team signing key
    pub signing_kid: Kid,
    /// Current team signing key. Only present for full members; bots load
    /// snapshots without it.
    pub signing_key: Option<SigningKey>,
    /// Members holding the restricted bot role
    pub restricted_bots: HashSet<UserId>,
}

impl TeamSnapshot {
    /// The team signing key.
    ///
    /// # Errors
    ///
    /// `NotPermitted` if this identity cannot sign for the team.
    pub fn signing_key(&self) -> Result<&SigningKey, TeambotError> {
        self.signing_key.as_ref().ok_or_else(|| {
            TeambotError::NotPermitted(format!("no signing key for team {:032x}", self.team_id))
        })
    }

    /// Whether `uid` currently holds the restricted bot role.
    pub fn is_restricted_bot(&self, uid: UserId) -> bool {
        self.restricted_bots.contains(&uid)
    }
}

impl fmt::Debug for TeamSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeamSnapshot")
            .field("team_id", &self.team_id)
            .field("generation", &self.generation)
            .field("signing_kid", &self.signing_kid)
            .field("can_sign", &self.signing_key.is_some())
            .field("restricted_bots", &self.restricted_bots.len())
            .finish()
    }
}

/// Loads team state from the team/sigchain service.
#[async_trait]
pub trait TeamLoader: Send + Sync {
    /// Load the team. `force_reload` bypasses any local cache and asks the
    /// server for the authoritative state.
    async fn load(&self, team_id: TeamId, force_reload: bool) -> Result<TeamSnapshot, TeambotError>;

    /// Application key at `generation`, or at the latest generation if
    /// `None`.
    async fn application_key(
        &self,
        team_id: TeamId,
        application: Application,
        generation: Option<TeambotKeyGeneration>,
    ) -> Result<ApplicationKey, TeambotError>;
}
