//! Simulated teams and users.
//!
//! [`SimWorld`] is the authoritative state: team generations, signing keys,
//! application keys, membership roles, and every user's encryption keys. The
//! registry reads it directly through [`ServerTeamView`]. Clients see it
//! through [`SimTeamLoader`] and [`SimUserDirectory`], which cache what they
//! loaded until asked to force a reload, the way a real client lags behind
//! the sigchain.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory state only")]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use teambot_core::{
    Application, ApplicationKey, BotKeyring, PukGeneration, TeamId, TeamLoader, TeamSnapshot,
    TeambotError, TeambotKeyGeneration, UserEncryptionKey, UserId, UserKeyDirectory,
};
use teambot_crypto::{EncryptionKeyPair, KEY_SIZE, Kid};
use teambot_server::{ServerTeamView, TeamRecord};

struct SimTeam {
    generation: TeambotKeyGeneration,
    /// Index `g - 1` signs generation `g`
    signing_keys: Vec<SigningKey>,
    members: HashSet<UserId>,
    bots: HashSet<UserId>,
    application_keys: HashMap<(Application, TeambotKeyGeneration), [u8; KEY_SIZE]>,
}

impl SimTeam {
    fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_keys.last()
    }

    fn signing_kid(&self) -> Kid {
        self.signing_key().map_or(Kid::from_bytes([0; KEY_SIZE]), |key| {
            Kid::from_bytes(key.verifying_key().to_bytes())
        })
    }
}

struct WorldState {
    rng: ChaCha20Rng,
    teams: HashMap<TeamId, SimTeam>,
    /// Index `g - 1` is encryption key generation `g`
    users: HashMap<UserId, Vec<EncryptionKeyPair>>,
}

impl WorldState {
    fn random_key(&mut self) -> [u8; KEY_SIZE] {
        let mut bytes = [0u8; KEY_SIZE];
        self.rng.fill_bytes(&mut bytes);
        bytes
    }

    fn team(&self, team_id: TeamId) -> Result<&SimTeam, TeambotError> {
        self.teams
            .get(&team_id)
            .ok_or_else(|| TeambotError::Team(format!("team {team_id:032x} not found")))
    }
}

/// Authoritative simulated team and user state. Clones share state.
#[derive(Clone)]
pub struct SimWorld {
    state: Arc<Mutex<WorldState>>,
}

impl SimWorld {
    /// Empty world whose keys come from a ChaCha20 stream seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState {
                rng: ChaCha20Rng::seed_from_u64(seed),
                teams: HashMap::new(),
                users: HashMap::new(),
            })),
        }
    }

    #[allow(clippy::expect_used)]
    fn state(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().expect("SimWorld mutex poisoned")
    }

    /// Register a user with a first encryption key. Returns its generation.
    pub fn add_user(&self, uid: UserId) -> PukGeneration {
        let mut state = self.state();
        let keypair = EncryptionKeyPair::from_secret_bytes(state.random_key());
        let keys = state.users.entry(uid).or_default();
        keys.push(keypair);
        keys.len() as PukGeneration
    }

    /// Give `uid` a new encryption key. Returns the new generation.
    pub fn rotate_user_key(&self, uid: UserId) -> PukGeneration {
        self.add_user(uid)
    }

    /// Create a team at generation 1.
    pub fn create_team(&self, team_id: TeamId, members: &[UserId], bots: &[UserId]) {
        let mut state = self.state();
        let signing = SigningKey::from_bytes(&state.random_key());
        state.teams.insert(
            team_id,
            SimTeam {
                generation: 1,
                signing_keys: vec![signing],
                members: members.iter().copied().collect(),
                bots: bots.iter().copied().collect(),
                application_keys: HashMap::new(),
            },
        );
    }

    /// Rotate the team key: new generation, new signing key. Returns the new
    /// generation.
    ///
    /// # Panics
    ///
    /// Panics if the team does not exist.
    #[allow(clippy::expect_used)]
    pub fn rotate_team_key(&self, team_id: TeamId) -> TeambotKeyGeneration {
        let mut state = self.state();
        let signing = SigningKey::from_bytes(&state.random_key());
        let team = state.teams.get_mut(&team_id).expect("rotate_team_key: unknown team");
        team.generation += 1;
        team.signing_keys.push(signing);
        team.generation
    }

    /// Grant `bot` the restricted bot role.
    #[allow(clippy::expect_used)]
    pub fn add_bot(&self, team_id: TeamId, bot: UserId) {
        let mut state = self.state();
        state.teams.get_mut(&team_id).expect("add_bot: unknown team").bots.insert(bot);
    }

    /// Remove `bot` from the team.
    #[allow(clippy::expect_used)]
    pub fn remove_bot(&self, team_id: TeamId, bot: UserId) {
        let mut state = self.state();
        state.teams.get_mut(&team_id).expect("remove_bot: unknown team").bots.remove(&bot);
    }

    /// Current generation of `team_id`.
    pub fn team_generation(&self, team_id: TeamId) -> Option<TeambotKeyGeneration> {
        self.state().teams.get(&team_id).map(|team| team.generation)
    }

    /// Latest encryption key of `uid`.
    pub fn latest_encryption_key(&self, uid: UserId) -> Option<UserEncryptionKey> {
        let state = self.state();
        let keys = state.users.get(&uid)?;
        keys.last().map(|keypair| UserEncryptionKey {
            generation: keys.len() as PukGeneration,
            public: keypair.public_bytes(),
        })
    }

    /// `uid`'s view of teams, cached until a forced reload.
    pub fn team_loader(&self, uid: UserId) -> SimTeamLoader {
        SimTeamLoader {
            world: self.clone(),
            uid,
            cache: Mutex::new(HashMap::new()),
            forced_loads: AtomicUsize::new(0),
        }
    }

    /// Public key directory, cached until a forced refresh.
    pub fn user_directory(&self) -> SimUserDirectory {
        SimUserDirectory { world: self.clone(), cache: Mutex::new(HashMap::new()) }
    }

    /// Keyring holding every encryption key `bot` ever had.
    pub fn bot_keyring(&self, bot: UserId) -> SimBotKeyring {
        SimBotKeyring { world: self.clone(), uid: bot, syncs: AtomicUsize::new(0) }
    }

    fn snapshot(&self, team_id: TeamId, uid: UserId) -> Result<TeamSnapshot, TeambotError> {
        let state = self.state();
        let team = state.team(team_id)?;
        let signing_key =
            if team.members.contains(&uid) { team.signing_key().cloned() } else { None };

        Ok(TeamSnapshot {
            team_id,
            generation: team.generation,
            signing_kid: team.signing_kid(),
            signing_key,
            restricted_bots: team.bots.clone(),
        })
    }

    fn application_key(
        &self,
        team_id: TeamId,
        uid: UserId,
        application: Application,
        generation: Option<TeambotKeyGeneration>,
    ) -> Result<ApplicationKey, TeambotError> {
        let mut state = self.state();
        let team = state.team(team_id)?;
        if !team.members.contains(&uid) {
            return Err(TeambotError::NotPermitted(format!(
                "user {uid:032x} cannot read application keys of team {team_id:032x}"
            )));
        }

        let generation = generation.unwrap_or(team.generation);
        if generation == 0 || generation > team.generation {
            return Err(TeambotError::Team(format!(
                "team {team_id:032x} has no generation {generation}"
            )));
        }

        let existing = team.application_keys.get(&(application, generation)).copied();
        let key = match existing {
            Some(key) => key,
            None => {
                let key = state.random_key();
                if let Some(team) = state.teams.get_mut(&team_id) {
                    team.application_keys.insert((application, generation), key);
                }
                key
            },
        };
        Ok(ApplicationKey::new(application, generation, key))
    }
}

impl ServerTeamView for SimWorld {
    fn team(&self, team_id: TeamId) -> Option<TeamRecord> {
        let state = self.state();
        let team = state.teams.get(&team_id)?;
        Some(TeamRecord {
            generation: team.generation,
            signing_kid: team.signing_kid(),
            restricted_bots: team.bots.clone(),
        })
    }

    fn latest_puk_generation(&self, uid: UserId) -> Option<PukGeneration> {
        self.latest_encryption_key(uid).map(|key| key.generation)
    }
}

/// One user's cached view of their teams.
pub struct SimTeamLoader {
    world: SimWorld,
    uid: UserId,
    cache: Mutex<HashMap<TeamId, TeamSnapshot>>,
    forced_loads: AtomicUsize,
}

impl SimTeamLoader {
    /// How many loads bypassed the cache on request.
    pub fn forced_loads(&self) -> usize {
        self.forced_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TeamLoader for SimTeamLoader {
    #[allow(clippy::expect_used)]
    async fn load(
        &self,
        team_id: TeamId,
        force_reload: bool,
    ) -> Result<TeamSnapshot, TeambotError> {
        if force_reload {
            self.forced_loads.fetch_add(1, Ordering::SeqCst);
        } else if let Some(cached) =
            self.cache.lock().expect("SimTeamLoader mutex poisoned").get(&team_id)
        {
            return Ok(cached.clone());
        }

        let snapshot = self.world.snapshot(team_id, self.uid)?;
        self.cache
            .lock()
            .expect("SimTeamLoader mutex poisoned")
            .insert(team_id, snapshot.clone());
        Ok(snapshot)
    }

    async fn application_key(
        &self,
        team_id: TeamId,
        application: Application,
        generation: Option<TeambotKeyGeneration>,
    ) -> Result<ApplicationKey, TeambotError> {
        self.world.application_key(team_id, self.uid, application, generation)
    }
}

/// Public encryption key lookups, cached per user.
pub struct SimUserDirectory {
    world: SimWorld,
    cache: Mutex<HashMap<UserId, UserEncryptionKey>>,
}

#[async_trait]
impl UserKeyDirectory for SimUserDirectory {
    #[allow(clippy::expect_used)]
    async fn latest_encryption_key(
        &self,
        uid: UserId,
        force_refresh: bool,
    ) -> Result<Option<UserEncryptionKey>, TeambotError> {
        let mut cache = self.cache.lock().expect("SimUserDirectory mutex poisoned");
        if !force_refresh {
            if let Some(key) = cache.get(&uid) {
                return Ok(Some(*key));
            }
        }

        let latest = self.world.latest_encryption_key(uid);
        match latest {
            Some(key) => {
                cache.insert(uid, key);
            },
            None => {
                cache.remove(&uid);
            },
        }
        Ok(latest)
    }
}

/// A bot's own encryption keys.
pub struct SimBotKeyring {
    world: SimWorld,
    uid: UserId,
    syncs: AtomicUsize,
}

impl SimBotKeyring {
    /// How many times the keyer asked for a sync.
    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotKeyring for SimBotKeyring {
    fn uid(&self) -> UserId {
        self.uid
    }

    async fn encryption_key(
        &self,
        generation: PukGeneration,
    ) -> Result<Option<EncryptionKeyPair>, TeambotError> {
        let Some(index) = generation.checked_sub(1) else {
            return Ok(None);
        };
        let state = self.world.state();
        Ok(state
            .users
            .get(&self.uid)
            .and_then(|keys| usize::try_from(index).ok().and_then(|i| keys.get(i)))
            .cloned())
    }

    async fn sync(&self) -> Result<(), TeambotError> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
