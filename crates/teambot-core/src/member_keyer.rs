//! Member-side keyer: derive, seal, sign and publish keys for bots.
//!
//! Any full member can do this for any bot, and several may do it at once.
//! Nothing coordinates them: every member derives the same seed, and the
//! server keeps the first publish for a generation and acknowledges the rest
//! as already existing. When the server reports that team or bot state moved
//! underneath a publish, the whole operation is retried against fresh state.
//!
//! A record signed by a team key that has since rotated out is not good
//! enough: publishing again under the current key replaces it. The local
//! record of what was published remembers the signer for that reason, and a
//! bot asking for a key always gets a fresh publish attempt.

use std::sync::Arc;

use teambot_crypto::{Kid, derive_kid_key_pair, derive_teambot_seed};

use crate::{
    boxing::box_seed,
    cache::{CacheKey, VolatileCache},
    config::KeyerConfig,
    env::Environment,
    error::TeambotError,
    keyring::UserKeyDirectory,
    lock_table::LockTable,
    notify::{Notifier, announce_key_created},
    sig::sign_metadata,
    team::TeamLoader,
    transport::{BoxedKeyEnvelope, KeyRequest, KeyServer, PublishOutcome, ServerStatus},
    types::{
        Application, ApplicationKey, TeamId, TeambotKey, TeambotKeyGeneration, TeambotKeyMetadata,
        UserId,
    },
};

/// Collaborators the member keyer talks to.
#[derive(Clone)]
pub struct MemberContext {
    /// Team/sigchain service
    pub teams: Arc<dyn TeamLoader>,
    /// Other users' public encryption keys
    pub users: Arc<dyn UserKeyDirectory>,
    /// Coordinating server
    pub server: Arc<dyn KeyServer>,
    /// Notification bus
    pub notifier: Arc<dyn Notifier>,
}

/// State to reload from its source on the next publish attempt.
#[derive(Debug, Clone, Copy, Default)]
struct Refresh {
    team: bool,
    bot_key: bool,
}

/// What this member last saw published for one key.
#[derive(Debug, Clone)]
struct Published {
    metadata: TeambotKeyMetadata,
    signer: Kid,
}

/// Producer of teambot keys.
pub struct MemberKeyer<E> {
    env: E,
    ctx: MemberContext,
    config: KeyerConfig,
    locks: LockTable<(TeamId, Application)>,
    published: VolatileCache<CacheKey, Published>,
}

impl<E: Environment> MemberKeyer<E> {
    /// Create a keyer.
    pub fn new(env: E, ctx: MemberContext, config: KeyerConfig) -> Self {
        let published = VolatileCache::new(config.cache_capacity);
        Self { env, ctx, config, locks: LockTable::new(), published }
    }

    /// Derive the teambot key for `bot` from `application_key` and make sure
    /// it is published.
    ///
    /// Returns the key and whether this call created the server's record.
    /// Keys for bots that are no longer restricted members are computed and
    /// returned but not published.
    ///
    /// # Errors
    ///
    /// - `Server` with a race status if the race persisted through every
    ///   attempt
    /// - `NoEncryptionKey` if the bot has no encryption key
    /// - `NotPermitted` if this identity cannot sign for the team
    /// - Any collaborator error, unchanged
    pub async fn get_or_create_teambot_key(
        &self,
        team_id: TeamId,
        bot: UserId,
        application_key: &ApplicationKey,
    ) -> Result<(TeambotKey, bool), TeambotError> {
        let max_attempts = self.config.max_publish_attempts.max(1);
        let mut refresh = Refresh::default();
        let mut attempt = 1;

        loop {
            match self.try_get_or_create(team_id, bot, application_key, refresh).await {
                Err(TeambotError::Server { status, message })
                    if status.is_publish_race() && attempt < max_attempts =>
                {
                    tracing::warn!(
                        team_id = %format_args!("{team_id:032x}"),
                        bot = %format_args!("{bot:032x}"),
                        application = %application_key.application,
                        generation = application_key.generation,
                        status = status.code(),
                        attempt,
                        %message,
                        "Teambot key publish raced, retrying"
                    );
                    if status == ServerStatus::OldBoxedGeneration {
                        refresh.bot_key = true;
                    } else {
                        refresh.team = true;
                    }
                    attempt += 1;
                },
                result => return result,
            }
        }
    }

    async fn try_get_or_create(
        &self,
        team_id: TeamId,
        bot: UserId,
        application_key: &ApplicationKey,
        refresh: Refresh,
    ) -> Result<(TeambotKey, bool), TeambotError> {
        let application = application_key.application;
        let generation = application_key.generation;
        let _guard = self.locks.lock((team_id, application)).await;

        let seed =
            derive_teambot_seed(application_key.key(), &bot.to_be_bytes(), application.tag());

        let team = self.ctx.teams.load(team_id, refresh.team).await?;

        let cache_key = CacheKey { bot, team_id, application, generation };
        if let Some(published) = self.published.get(&cache_key) {
            if published.signer == team.signing_kid {
                return Ok((TeambotKey { seed, metadata: published.metadata }, false));
            }
            self.published.remove(&cache_key);
        }

        let eligible = team.is_restricted_bot(bot);

        let recipient = self
            .ctx
            .users
            .latest_encryption_key(bot, refresh.bot_key)
            .await?
            .ok_or(TeambotError::NoEncryptionKey { uid: bot })?;

        let metadata = TeambotKeyMetadata {
            kid: derive_kid_key_pair(&seed).kid(),
            generation,
            uid: bot,
            puk_generation: recipient.generation,
            application,
        };
        let boxed = box_seed(&self.env, &seed, metadata.clone(), &recipient.public)?;
        let signature = sign_metadata(team.signing_key()?, &metadata)?;

        if !eligible {
            tracing::debug!(
                team_id = %format_args!("{team_id:032x}"),
                bot = %format_args!("{bot:032x}"),
                %application,
                generation,
                "Bot is not a restricted member, skipping publish"
            );
            return Ok((TeambotKey { seed, metadata }, false));
        }

        let request = KeyRequest::new(team_id, bot, application, generation);
        let envelope = BoxedKeyEnvelope { ciphertext: boxed.ciphertext, signature };
        let outcome = match self.ctx.server.publish(&request, &envelope).await {
            Err(TeambotError::Server { status: ServerStatus::GenerationExists, .. }) => {
                PublishOutcome::AlreadyExists
            },
            result => result?,
        };

        let created = outcome == PublishOutcome::Created;
        if created {
            tracing::info!(
                team_id = %format_args!("{team_id:032x}"),
                bot = %format_args!("{bot:032x}"),
                %application,
                generation,
                puk_generation = recipient.generation,
                "Published teambot key"
            );
            announce_key_created(self.ctx.notifier.as_ref(), team_id, bot, application, generation)
                .await;
        } else {
            tracing::debug!(
                team_id = %format_args!("{team_id:032x}"),
                %application,
                generation,
                "Teambot key already published"
            );
        }

        self.published
            .put(cache_key, Published { metadata: metadata.clone(), signer: team.signing_kid });
        Ok((TeambotKey { seed, metadata }, created))
    }

    /// Answer a bot's request for a key. Generation 0 means the latest.
    ///
    /// The bot asks because what is on the server is missing or signed by a
    /// stale team key, so whatever this member remembers publishing is
    /// ignored and the key is published again.
    pub async fn handle_key_needed(
        &self,
        team_id: TeamId,
        bot: UserId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> Result<(TeambotKey, bool), TeambotError> {
        let requested = (generation > 0).then_some(generation);
        let application_key =
            self.ctx.teams.application_key(team_id, application, requested).await?;
        self.published.remove(&CacheKey {
            bot,
            team_id,
            application,
            generation: application_key.generation,
        });
        self.get_or_create_teambot_key(team_id, bot, &application_key).await
    }

    /// Publish chat and key-value store keys at the latest generation for
    /// every restricted bot in the team.
    ///
    /// Run after membership changes and key rotations. A failure for one bot
    /// is logged and does not stop the others. Returns how many records this
    /// call created.
    pub async fn create_for_bots(&self, team_id: TeamId) -> Result<usize, TeambotError> {
        let team = self.ctx.teams.load(team_id, false).await?;
        let mut bots: Vec<UserId> = team.restricted_bots.iter().copied().collect();
        bots.sort_unstable();

        let mut created = 0;
        for application in Application::BOT_APPLICATIONS {
            let application_key =
                self.ctx.teams.application_key(team_id, application, None).await?;

            for &bot in &bots {
                match self.get_or_create_teambot_key(team_id, bot, &application_key).await {
                    Ok((_, true)) => created += 1,
                    Ok((_, false)) => {},
                    Err(e) => tracing::warn!(
                        team_id = %format_args!("{team_id:032x}"),
                        bot = %format_args!("{bot:032x}"),
                        %application,
                        error = %e,
                        "Failed to create teambot key"
                    ),
                }
            }
        }

        Ok(created)
    }

    /// Forget which bots already have a key at `generation`.
    pub fn purge_cache_at_generation(
        &self,
        team_id: TeamId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) {
        self.published.remove_where(|key| key.matches(team_id, application, generation));
    }

    /// Forget everything published for `team_id` after its membership or keys
    /// changed.
    pub fn on_team_changed(&self, team_id: TeamId) {
        let removed = self.published.remove_where(|key| key.team_id == team_id);
        tracing::debug!(
            team_id = %format_args!("{team_id:032x}"),
            removed,
            "Purged published teambot keys on team change"
        );
    }

    /// Drop all cached state for the logged-out identity.
    pub fn on_logout(&self) {
        self.published.clear();
    }

    /// Drop all cached state after a local storage reset.
    pub fn on_db_nuke(&self) {
        self.published.clear();
    }
}
