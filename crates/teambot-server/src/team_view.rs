//! What the registry needs to know about teams and users.
//!
//! The registry does not own team state. It consults a view that the
//! deployment backs with its team and user stores.

use std::collections::HashSet;

use teambot_core::{PukGeneration, TeamId, TeambotKeyGeneration, UserId};
use teambot_crypto::Kid;

/// Server-side facts about one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRecord {
    /// Current team key generation
    pub generation: TeambotKeyGeneration,
    /// Kid of the current team signing key
    pub signing_kid: Kid,
    /// Members with the restricted bot role
    pub restricted_bots: HashSet<UserId>,
}

/// Read access to team and user state.
pub trait ServerTeamView: Send + Sync {
    /// Current state of `team_id`, or `None` if the team does not exist.
    fn team(&self, team_id: TeamId) -> Option<TeamRecord>;

    /// Latest encryption key generation of `uid`.
    fn latest_puk_generation(&self, uid: UserId) -> Option<PukGeneration>;
}
