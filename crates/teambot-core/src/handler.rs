//! Incoming teambot notifications.
//!
//! Members answer "key needed" by publishing; bots answer "key created" by
//! dropping any cached copy of that generation so the next use picks up the
//! newly signed record. A process may be either, so both keyers are
//! optional.

use std::sync::Arc;

use crate::{
    bot_keyer::BotKeyer,
    env::Environment,
    error::TeambotError,
    member_keyer::MemberKeyer,
    notify::TeambotNotification,
    storage::KeyValueStore,
};

/// Routes [`TeambotNotification`]s to the keyer that owns them.
pub struct NotificationHandler<E, S> {
    member: Option<Arc<MemberKeyer<E>>>,
    bot: Option<Arc<BotKeyer<E, S>>>,
}

impl<E: Environment, S: KeyValueStore> NotificationHandler<E, S> {
    /// Handler with no keyers attached; every notification is ignored.
    pub fn new() -> Self {
        Self { member: None, bot: None }
    }

    /// Answer key requests with this member keyer.
    #[must_use]
    pub fn with_member(mut self, member: Arc<MemberKeyer<E>>) -> Self {
        self.member = Some(member);
        self
    }

    /// Invalidate this bot keyer's cache on key creation.
    #[must_use]
    pub fn with_bot(mut self, bot: Arc<BotKeyer<E, S>>) -> Self {
        self.bot = Some(bot);
        self
    }

    /// Handle one notification.
    pub async fn handle(&self, notification: TeambotNotification) -> Result<(), TeambotError> {
        match notification {
            TeambotNotification::KeyNeeded { team_id, bot, application, generation } => {
                let Some(member) = &self.member else {
                    return Ok(());
                };
                member.handle_key_needed(team_id, bot, application, generation).await?;
            },
            TeambotNotification::KeyCreated { team_id, bot, application, generation } => {
                let Some(keyer) = self.bot.as_ref().filter(|keyer| keyer.uid() == bot) else {
                    return Ok(());
                };
                tracing::debug!(
                    team_id = %format_args!("{team_id:032x}"),
                    %application,
                    generation,
                    "Teambot key created, dropping cached copy"
                );
                keyer.purge_cache_at_generation(team_id, application, generation)?;
            },
        }
        Ok(())
    }
}

impl<E: Environment, S: KeyValueStore> Default for NotificationHandler<E, S> {
    fn default() -> Self {
        Self::new()
    }
}
