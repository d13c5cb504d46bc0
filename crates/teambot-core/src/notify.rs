//! Notification glue.
//!
//! Two broadcasts to the members of a team: a bot needs a key that nobody has
//! published, or a member just published one. Delivery is best-effort. The
//! bot-side fallback walk and the member-side idempotent publish exist so
//! that a lost notification only delays key availability.

use async_trait::async_trait;

use crate::{
    error::TeambotError,
    types::{Application, TeamId, TeambotKeyGeneration, UserId},
};

/// Teambot notifications as delivered to a team member or bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeambotNotification {
    /// A bot could not find a key. Generation 0 asks for the latest.
    KeyNeeded {
        /// Team the key is for
        team_id: TeamId,
        /// The bot asking
        bot: UserId,
        /// Key space
        application: Application,
        /// Missing generation
        generation: TeambotKeyGeneration,
    },
    /// A member published (or re-signed) a key.
    KeyCreated {
        /// Team the key is for
        team_id: TeamId,
        /// The bot the key was made for
        bot: UserId,
        /// Key space
        application: Application,
        /// Published generation
        generation: TeambotKeyGeneration,
    },
}

/// Outgoing side of the notification bus.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Ask the team's members to publish a key for `bot`.
    async fn key_needed(
        &self,
        team_id: TeamId,
        bot: UserId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> Result<(), TeambotError>;

    /// Tell the team (and the bot) a key was published.
    async fn key_created(
        &self,
        team_id: TeamId,
        bot: UserId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> Result<(), TeambotError>;
}

/// Send a "key needed" broadcast, logging instead of failing.
pub async fn announce_key_needed(
    notifier: &dyn Notifier,
    team_id: TeamId,
    bot: UserId,
    application: Application,
    generation: TeambotKeyGeneration,
) {
    tracing::debug!(
        team_id = %format_args!("{team_id:032x}"),
        bot = %format_args!("{bot:032x}"),
        %application,
        generation,
        "Requesting teambot key"
    );

    if let Err(e) = notifier.key_needed(team_id, bot, application, generation).await {
        tracing::warn!(
            team_id = %format_args!("{team_id:032x}"),
            %application,
            generation,
            error = %e,
            "Failed to send teambot key needed notification"
        );
    }
}

/// Send a "key created" broadcast, logging instead of failing.
pub async fn announce_key_created(
    notifier: &dyn Notifier,
    team_id: TeamId,
    bot: UserId,
    application: Application,
    generation: TeambotKeyGeneration,
) {
    if let Err(e) = notifier.key_created(team_id, bot, application, generation).await {
        tracing::warn!(
            team_id = %format_args!("{team_id:032x}"),
            %application,
            generation,
            error = %e,
            "Failed to send teambot key created notification"
        );
    }
}
