//! Bot-side keyer: fetch, verify, and unbox keys members published.
//!
//! Two entry points with different tolerance for staleness:
//!
//! - [`BotKeyer::get_latest_teambot_key`] is for encrypting. It prefers the
//!   newest generation and walks down to older ones while members catch up,
//!   asking for each missing generation along the way. Older generations are
//!   always subject to the freshness window.
//! - [`BotKeyer::get_teambot_key_at_generation`] is for decrypting. It never
//!   substitutes another generation.
//!
//! Both serialize per team.
//!
//! Resolved keys are cached in memory and in the bot's local store. Persisted
//! entries are sealed with the bot's storage key, so the store never holds a
//! seed in the clear.

use std::sync::Arc;

use teambot_crypto::{EncryptionKeyPair, KEY_SIZE};

use crate::{
    boxing::unbox,
    cache::{CacheKey, CachedKey, TieredKeyCache},
    config::KeyerConfig,
    env::Environment,
    error::TeambotError,
    keyring::BotKeyring,
    lock_table::LockTable,
    notify::{Notifier, announce_key_needed},
    sig::verify_against_latest_team_key,
    storage::{EncryptedStore, KeyValueStore},
    team::TeamLoader,
    transport::{KeyRequest, KeyServer},
    types::{
        Application, PukGeneration, TeamId, TeambotKey, TeambotKeyBoxed, TeambotKeyGeneration,
        UserId,
    },
    wrong_kid::{WrongKidCheck, WrongKidKey, WrongKidTracker},
};

/// Collaborators the bot keyer talks to.
#[derive(Clone)]
pub struct BotContext {
    /// Team/sigchain service, as visible to a restricted member
    pub teams: Arc<dyn TeamLoader>,
    /// The bot's own keyring
    pub keyring: Arc<dyn BotKeyring>,
    /// Coordinating server
    pub server: Arc<dyn KeyServer>,
    /// Notification bus
    pub notifier: Arc<dyn Notifier>,
}

/// Consumer of teambot keys.
pub struct BotKeyer<E, S> {
    env: E,
    ctx: BotContext,
    locks: LockTable<TeamId>,
    cache: TieredKeyCache<EncryptedStore<S, E>>,
    wrong_kid: WrongKidTracker<S>,
}

impl<E: Environment, S: KeyValueStore> BotKeyer<E, S> {
    /// Create a keyer. `store` holds both the persistent cache tier, sealed
    /// under `storage_key`, and the freshness records.
    pub fn new(
        env: E,
        ctx: BotContext,
        store: S,
        storage_key: [u8; KEY_SIZE],
        config: &KeyerConfig,
    ) -> Self {
        let sealed = EncryptedStore::new(store.clone(), env.clone(), storage_key);
        Self {
            env,
            ctx,
            locks: LockTable::new(),
            cache: TieredKeyCache::new(sealed, config.cache_capacity),
            wrong_kid: WrongKidTracker::new(store, config.wrong_kid_grace),
        }
    }

    /// The bot this keyer resolves keys for.
    pub fn uid(&self) -> UserId {
        self.ctx.keyring.uid()
    }

    /// Newest usable key for encrypting.
    ///
    /// Walks from the team's current generation down to 1. Every generation
    /// that nobody has published yet gets a "key needed" broadcast; the first
    /// one that resolves wins.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` for the oldest generation tried if none exist
    /// - `WrongKidExpired` if a generation exists but its window has closed
    /// - `IntegrityFailure` if a record fails to unbox
    pub async fn get_latest_teambot_key(
        &self,
        team_id: TeamId,
        application: Application,
    ) -> Result<TeambotKey, TeambotError> {
        let _guard = self.locks.lock(team_id).await;

        let latest = self.ctx.teams.load(team_id, false).await?.generation;
        let mut last_err = TeambotError::KeyNotFound { team_id, application, generation: latest };

        for generation in (1..=latest).rev() {
            let force_wrong_kid = generation < latest;
            match self.resolve_locked(team_id, application, generation, force_wrong_kid).await {
                Ok(key) => {
                    if generation < latest {
                        tracing::debug!(
                            team_id = %format_args!("{team_id:032x}"),
                            %application,
                            generation,
                            latest,
                            "Using older teambot key generation"
                        );
                    }
                    return Ok(key);
                },
                Err(e @ TeambotError::KeyNotFound { .. }) => {
                    self.request_key(team_id, application, generation).await;
                    last_err = e;
                },
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }

    /// Key at exactly `generation`, for decrypting.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` after broadcasting a request for that generation; the
    /// caller may retry later. Other errors as for
    /// [`BotKeyer::get_latest_teambot_key`].
    pub async fn get_teambot_key_at_generation(
        &self,
        team_id: TeamId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> Result<TeambotKey, TeambotError> {
        let _guard = self.locks.lock(team_id).await;

        let result = self.resolve_locked(team_id, application, generation, false).await;
        if let Err(TeambotError::KeyNotFound { .. }) = result {
            self.request_key(team_id, application, generation).await;
        }
        result
    }

    /// Resolve one generation from cache or server.
    ///
    /// `force_wrong_kid` applies the freshness window even when the signer is
    /// the team's current key.
    pub async fn resolve(
        &self,
        team_id: TeamId,
        application: Application,
        generation: TeambotKeyGeneration,
        force_wrong_kid: bool,
    ) -> Result<TeambotKey, TeambotError> {
        let _guard = self.locks.lock(team_id).await;
        self.resolve_locked(team_id, application, generation, force_wrong_kid).await
    }

    async fn resolve_locked(
        &self,
        team_id: TeamId,
        application: Application,
        generation: TeambotKeyGeneration,
        force_wrong_kid: bool,
    ) -> Result<TeambotKey, TeambotError> {
        let bot = self.ctx.keyring.uid();
        let cache_key = CacheKey { bot, team_id, application, generation };

        if let Some(cached) = self.cache.get(&cache_key)? {
            if !(cached.wrong_kid || force_wrong_kid) {
                return Ok(cached.key);
            }
            if self.check_window(&cache_key)?.permitted {
                return Ok(cached.key);
            }
            // A member may have re-signed since this copy was cached
            self.cache.remove(&cache_key)?;
        }

        let request = KeyRequest::new(team_id, bot, application, generation);
        let Some(envelope) = self.ctx.server.fetch(&request).await? else {
            return Err(TeambotError::KeyNotFound { team_id, application, generation });
        };

        let verified =
            verify_against_latest_team_key(self.ctx.teams.as_ref(), team_id, &envelope.signature)
                .await
                .map_err(untrusted_record)?;
        let metadata = verified.metadata;
        let mismatched = metadata.uid != bot
            || metadata.application != application
            || metadata.generation != generation;
        if mismatched {
            return Err(TeambotError::IntegrityFailure {
                reason: format!(
                    "server returned key for bot {:032x} {} generation {}",
                    metadata.uid, metadata.application, metadata.generation
                ),
            });
        }
        if verified.wrong_kid {
            // Members answer by re-signing under the current team key
            self.request_key(team_id, application, generation).await;
        }

        let boxed = TeambotKeyBoxed { ciphertext: envelope.ciphertext, metadata };
        let keypair = self.encryption_key(boxed.metadata.puk_generation).await?;
        let key = unbox(&boxed, &keypair).map_err(untrusted_record)?;

        if verified.wrong_kid || force_wrong_kid {
            let check = self.check_window(&cache_key)?;
            if !check.permitted {
                tracing::warn!(
                    team_id = %format_args!("{team_id:032x}"),
                    %application,
                    generation,
                    first_seen = check.first_seen_secs,
                    "Teambot key freshness window closed"
                );
                return Err(TeambotError::WrongKidExpired {
                    team_id,
                    application,
                    generation,
                    first_seen_secs: check.first_seen_secs,
                });
            }
        }

        self.cache.put(cache_key, CachedKey { key: key.clone(), wrong_kid: verified.wrong_kid })?;
        tracing::debug!(
            team_id = %format_args!("{team_id:032x}"),
            %application,
            generation,
            wrong_kid = verified.wrong_kid,
            "Resolved teambot key"
        );
        Ok(key)
    }

    fn check_window(&self, cache_key: &CacheKey) -> Result<WrongKidCheck, TeambotError> {
        let key = WrongKidKey {
            team_id: cache_key.team_id,
            bot: cache_key.bot,
            application: cache_key.application,
            generation: cache_key.generation,
        };
        self.wrong_kid.check_and_record(&key, self.env.wall_clock_secs())
    }

    async fn encryption_key(
        &self,
        generation: PukGeneration,
    ) -> Result<EncryptionKeyPair, TeambotError> {
        if let Some(keypair) = self.ctx.keyring.encryption_key(generation).await? {
            return Ok(keypair);
        }

        self.ctx.keyring.sync().await?;
        self.ctx.keyring.encryption_key(generation).await?.ok_or_else(|| {
            TeambotError::Keyring(format!("no encryption key at generation {generation}"))
        })
    }

    async fn request_key(
        &self,
        team_id: TeamId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) {
        let bot = self.ctx.keyring.uid();
        announce_key_needed(self.ctx.notifier.as_ref(), team_id, bot, application, generation)
            .await;
    }

    /// Drop cached copies of one generation so the next use refetches.
    pub fn purge_cache_at_generation(
        &self,
        team_id: TeamId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> Result<(), TeambotError> {
        self.cache.remove_generation(self.ctx.keyring.uid(), team_id, application, generation)
    }

    /// Delete a key on the server and locally. Test deployments only.
    pub async fn delete_key_for_test(
        &self,
        team_id: TeamId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> Result<(), TeambotError> {
        let bot = self.ctx.keyring.uid();
        self.ctx
            .server
            .delete_for_test(&KeyRequest::new(team_id, bot, application, generation))
            .await?;
        self.purge_cache_at_generation(team_id, application, generation)
    }

    /// Drop every cached key, in memory and on disk.
    ///
    /// Freshness records are kept: a window that closed for this bot stays
    /// closed across sessions.
    pub fn on_logout(&self) -> Result<(), TeambotError> {
        let removed = self.cache.clear()?;
        tracing::debug!(removed, "Purged teambot key cache on logout");
        Ok(())
    }

    /// Drop in-memory state after the local store was wiped.
    pub fn on_db_nuke(&self) {
        self.cache.clear_volatile();
    }
}

/// A fetched record that fails to decode or verify will not get better on
/// retry.
fn untrusted_record(err: TeambotError) -> TeambotError {
    match err {
        TeambotError::Crypto(_) | TeambotError::Serialization(_) => {
            TeambotError::IntegrityFailure { reason: format!("untrusted record: {err}") }
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::{
            Mutex,
            atomic::{AtomicU64, AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use base64::{Engine, engine::general_purpose::STANDARD};
    use ed25519_dalek::SigningKey;
    use teambot_crypto::{Kid, Seed, derive_kid_key_pair};

    use super::*;
    use crate::{
        boxing::box_seed,
        sig::sign_metadata,
        storage::MemoryStore,
        team::TeamSnapshot,
        transport::{BoxedKeyEnvelope, PublishOutcome},
        types::{ApplicationKey, TeambotKeyMetadata},
    };

    const TEAM: TeamId = 0x7EA;
    const BOT: UserId = 0xB07;
    const GRACE: Duration = Duration::from_secs(1_000);

    #[derive(Clone, Default)]
    struct ManualEnv {
        now: Arc<AtomicU64>,
    }

    impl Environment for ManualEnv {
        fn wall_clock_secs(&self) -> u64 {
            self.now.load(Ordering::SeqCst)
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0x5A);
        }
    }

    struct Team {
        generation: TeambotKeyGeneration,
        signing: Mutex<SigningKey>,
    }

    #[async_trait]
    impl TeamLoader for Team {
        async fn load(&self, team_id: TeamId, _: bool) -> Result<TeamSnapshot, TeambotError> {
            let signing = self.signing.lock().unwrap();
            Ok(TeamSnapshot {
                team_id,
                generation: self.generation,
                signing_kid: Kid::from_bytes(signing.verifying_key().to_bytes()),
                signing_key: None,
                restricted_bots: HashSet::from([BOT]),
            })
        }

        async fn application_key(
            &self,
            _: TeamId,
            application: Application,
            generation: Option<TeambotKeyGeneration>,
        ) -> Result<ApplicationKey, TeambotError> {
            Err(TeambotError::NotPermitted(format!(
                "bots cannot load {application} keys at {generation:?}"
            )))
        }
    }

    struct Keyring {
        keys: HashMap<PukGeneration, EncryptionKeyPair>,
    }

    #[async_trait]
    impl BotKeyring for Keyring {
        fn uid(&self) -> UserId {
            BOT
        }

        async fn encryption_key(
            &self,
            generation: PukGeneration,
        ) -> Result<Option<EncryptionKeyPair>, TeambotError> {
            Ok(self.keys.get(&generation).cloned())
        }

        async fn sync(&self) -> Result<(), TeambotError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Server {
        records: Mutex<HashMap<TeambotKeyGeneration, BoxedKeyEnvelope>>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl KeyServer for Server {
        async fn fetch(
            &self,
            request: &KeyRequest,
        ) -> Result<Option<BoxedKeyEnvelope>, TeambotError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.lock().unwrap().get(&request.generation).cloned())
        }

        async fn publish(
            &self,
            request: &KeyRequest,
            envelope: &BoxedKeyEnvelope,
        ) -> Result<PublishOutcome, TeambotError> {
            self.records.lock().unwrap().insert(request.generation, envelope.clone());
            Ok(PublishOutcome::Created)
        }

        async fn delete_for_test(&self, request: &KeyRequest) -> Result<(), TeambotError> {
            self.records.lock().unwrap().remove(&request.generation);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Needed {
        generations: Mutex<Vec<TeambotKeyGeneration>>,
    }

    #[async_trait]
    impl Notifier for Needed {
        async fn key_needed(
            &self,
            _: TeamId,
            _: UserId,
            _: Application,
            generation: TeambotKeyGeneration,
        ) -> Result<(), TeambotError> {
            self.generations.lock().unwrap().push(generation);
            Ok(())
        }

        async fn key_created(
            &self,
            _: TeamId,
            _: UserId,
            _: Application,
            _: TeambotKeyGeneration,
        ) -> Result<(), TeambotError> {
            Ok(())
        }
    }

    struct Fixture {
        keyer: BotKeyer<ManualEnv, MemoryStore>,
        store: MemoryStore,
        env: ManualEnv,
        team: Arc<Team>,
        server: Arc<Server>,
        needed: Arc<Needed>,
        bot_key: EncryptionKeyPair,
    }

    fn fixture(latest: TeambotKeyGeneration) -> Fixture {
        let env = ManualEnv::default();
        env.now.store(10_000, Ordering::SeqCst);
        let bot_key = EncryptionKeyPair::from_secret_bytes([0x42; KEY_SIZE]);
        let team = Arc::new(Team {
            generation: latest,
            signing: Mutex::new(SigningKey::from_bytes(&[1; KEY_SIZE])),
        });
        let server = Arc::new(Server::default());
        let needed = Arc::new(Needed::default());
        let ctx = BotContext {
            teams: team.clone(),
            keyring: Arc::new(Keyring { keys: HashMap::from([(1, bot_key.clone())]) }),
            server: server.clone(),
            notifier: needed.clone(),
        };
        let config = KeyerConfig { wrong_kid_grace: GRACE, ..KeyerConfig::default() };
        let store = MemoryStore::new();
        let keyer = BotKeyer::new(env.clone(), ctx, store.clone(), [0x33; KEY_SIZE], &config);
        Fixture { keyer, store, env, team, server, needed, bot_key }
    }

    impl Fixture {
        /// Publish a record for `generation` signed by `signer`.
        fn publish(&self, generation: TeambotKeyGeneration, signer: &SigningKey) -> Seed {
            let seed = Seed::from_bytes([generation as u8; KEY_SIZE]);
            let metadata = TeambotKeyMetadata {
                kid: derive_kid_key_pair(&seed).kid(),
                generation,
                uid: BOT,
                puk_generation: 1,
                application: Application::Chat,
            };
            let boxed =
                box_seed(&self.env, &seed, metadata.clone(), &self.bot_key.public_bytes()).unwrap();
            let signature = sign_metadata(signer, &metadata).unwrap();
            self.server
                .records
                .lock()
                .unwrap()
                .insert(generation, BoxedKeyEnvelope { ciphertext: boxed.ciphertext, signature });
            seed
        }

        /// Rewrite the stored record for `generation`.
        fn tamper(&self, generation: TeambotKeyGeneration, edit: impl FnOnce(&mut Vec<u8>)) {
            let mut records = self.server.records.lock().unwrap();
            let Some(record) = records.get_mut(&generation) else {
                panic!("no record at generation {generation}");
            };
            let mut bytes = STANDARD.decode(&record.signature).unwrap();
            edit(&mut bytes);
            record.signature = STANDARD.encode(bytes);
        }

        fn current_signer(&self) -> SigningKey {
            self.team.signing.lock().unwrap().clone()
        }

        fn rotate_signer(&self) {
            *self.team.signing.lock().unwrap() = SigningKey::from_bytes(&[2; KEY_SIZE]);
        }

        fn advance(&self, secs: u64) {
            self.env.now.fetch_add(secs, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn resolves_and_caches() {
        let f = fixture(2);
        let seed = f.publish(2, &f.current_signer());

        let key = f.keyer.get_latest_teambot_key(TEAM, Application::Chat).await.unwrap();
        assert_eq!(key.seed, seed);

        f.keyer.get_latest_teambot_key(TEAM, Application::Chat).await.unwrap();
        assert_eq!(f.server.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn walks_down_to_older_generation() {
        let f = fixture(5);
        let seed = f.publish(3, &f.current_signer());

        let key = f.keyer.get_latest_teambot_key(TEAM, Application::Chat).await.unwrap();

        assert_eq!(key.generation(), 3);
        assert_eq!(key.seed, seed);
        assert_eq!(*f.needed.generations.lock().unwrap(), vec![5, 4]);
    }

    #[tokio::test]
    async fn older_generation_is_time_boxed() {
        let f = fixture(2);
        f.publish(1, &f.current_signer());

        f.keyer.get_latest_teambot_key(TEAM, Application::Chat).await.unwrap();
        f.advance(GRACE.as_secs());

        let err = f.keyer.get_latest_teambot_key(TEAM, Application::Chat).await.unwrap_err();
        assert!(matches!(err, TeambotError::WrongKidExpired { generation: 1, .. }));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn exact_generation_never_falls_back() {
        let f = fixture(3);
        f.publish(2, &f.current_signer());

        let err = f
            .keyer
            .get_teambot_key_at_generation(TEAM, Application::Chat, 3)
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(*f.needed.generations.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn stale_signer_is_usable_until_window_closes() {
        let f = fixture(1);
        let old = f.current_signer();
        f.publish(1, &old);
        f.rotate_signer();

        f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();
        f.advance(GRACE.as_secs() - 1);
        f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();
        f.advance(1);

        let err = f
            .keyer
            .get_teambot_key_at_generation(TEAM, Application::Chat, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TeambotError::WrongKidExpired { .. }));
    }

    #[tokio::test]
    async fn resigned_key_replaces_expired_copy() {
        let f = fixture(1);
        f.publish(1, &f.current_signer());
        f.rotate_signer();

        f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();
        f.advance(GRACE.as_secs());

        // A member re-signs with the current key
        f.publish(1, &f.current_signer());
        let key =
            f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();

        assert_eq!(key.generation(), 1);
        assert_eq!(f.server.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn logout_forces_refetch() {
        let f = fixture(1);
        f.publish(1, &f.current_signer());
        f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();

        f.keyer.on_logout().unwrap();
        f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();

        assert_eq!(f.server.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deleted_key_is_gone_everywhere() {
        let f = fixture(1);
        f.publish(1, &f.current_signer());
        f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();

        f.keyer.delete_key_for_test(TEAM, Application::Chat, 1).await.unwrap();

        let err = f
            .keyer
            .get_teambot_key_at_generation(TEAM, Application::Chat, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TeambotError::KeyNotFound { generation: 1, .. }));
    }

    #[tokio::test]
    async fn record_for_other_generation_is_rejected() {
        let f = fixture(2);
        f.publish(1, &f.current_signer());
        let misplaced = f.server.records.lock().unwrap()[&1].clone();
        f.server.records.lock().unwrap().insert(2, misplaced);

        let err = f
            .keyer
            .get_teambot_key_at_generation(TEAM, Application::Chat, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, TeambotError::IntegrityFailure { .. }));
    }

    #[tokio::test]
    async fn forged_signature_is_permanent() {
        let f = fixture(1);
        f.publish(1, &f.current_signer());
        f.tamper(1, |bytes| {
            let last = bytes.len() - 1;
            bytes[last] ^= 0x01;
        });

        let err = f
            .keyer
            .get_teambot_key_at_generation(TEAM, Application::Chat, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, TeambotError::IntegrityFailure { .. }));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn garbled_signature_is_permanent() {
        let f = fixture(1);
        f.publish(1, &f.current_signer());
        f.tamper(1, |bytes| bytes.truncate(3));

        let err = f
            .keyer
            .get_teambot_key_at_generation(TEAM, Application::Chat, 1)
            .await
            .unwrap_err();

        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn stale_signer_asks_members_to_resign() {
        let f = fixture(1);
        f.publish(1, &f.current_signer());

        f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();
        assert!(f.needed.generations.lock().unwrap().is_empty());

        f.keyer.purge_cache_at_generation(TEAM, Application::Chat, 1).unwrap();
        f.rotate_signer();
        f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();

        assert_eq!(*f.needed.generations.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn window_opens_on_first_usable_copy() {
        let f = fixture(1);
        let old = f.current_signer();
        f.rotate_signer();

        // Stale signer and a ciphertext that will not open
        f.publish(1, &old);
        f.server.records.lock().unwrap().get_mut(&1).unwrap().ciphertext = STANDARD.encode([0; 64]);
        let err = f
            .keyer
            .get_teambot_key_at_generation(TEAM, Application::Chat, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TeambotError::IntegrityFailure { .. }));

        f.advance(GRACE.as_secs());
        let seed = f.publish(1, &old);
        let key =
            f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();

        assert_eq!(key.seed, seed);
    }

    #[tokio::test]
    async fn persisted_seed_is_sealed() {
        let f = fixture(1);
        let seed = f.publish(1, &f.current_signer());
        f.keyer.get_teambot_key_at_generation(TEAM, Application::Chat, 1).await.unwrap();

        let cache_key =
            CacheKey { bot: BOT, team_id: TEAM, application: Application::Chat, generation: 1 };
        let raw = f.store.get(&cache_key.storage_key()).unwrap().unwrap();
        let seed: &[u8] = seed.as_bytes();

        assert!(!raw.windows(seed.len()).any(|w| w == seed));
    }
}
