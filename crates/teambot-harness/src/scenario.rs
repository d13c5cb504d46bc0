//! Wiring for simulated deployments.
//!
//! A [`Scenario`] owns one clock, one world, one server, and one notification
//! bus, and hands out keyers connected to them. Every keyer built from the
//! same scenario sees the same server state.

use std::sync::Arc;

use teambot_core::{
    BotContext, BotKeyer, KeyValueStore, KeyerConfig, MemberContext, MemberKeyer, MemoryStore,
    UserId,
};

use teambot_crypto::KEY_SIZE;

use crate::{RecordingNotifier, SimBotKeyring, SimEnv, SimKeyServer, SimTeamLoader, SimWorld};

/// A member keyer plus handles to the collaborators it was built with.
pub struct SimMember {
    /// The keyer under test
    pub keyer: Arc<MemberKeyer<SimEnv>>,
    /// The member's cached view of their teams
    pub teams: Arc<SimTeamLoader>,
}

/// A bot keyer plus handles to the collaborators it was built with.
pub struct SimBot<S: KeyValueStore = MemoryStore> {
    /// The keyer under test
    pub keyer: Arc<BotKeyer<SimEnv, S>>,
    /// The bot's cached view of its teams
    pub teams: Arc<SimTeamLoader>,
    /// The bot's own encryption keys
    pub keyring: Arc<SimBotKeyring>,
    /// The bot's persistent store, as written (sealed cache entries included)
    pub store: S,
}

/// Shared simulated infrastructure.
pub struct Scenario {
    /// Clock and randomness shared by every keyer
    pub env: SimEnv,
    /// Authoritative team and user state
    pub world: SimWorld,
    /// Coordinating server
    pub server: SimKeyServer,
    /// Notification bus
    pub notifier: RecordingNotifier,
    /// Configuration handed to every keyer
    pub config: KeyerConfig,
}

impl Scenario {
    /// Scenario with default keyer configuration.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, KeyerConfig::default())
    }

    /// Scenario with explicit keyer configuration.
    pub fn with_config(seed: u64, config: KeyerConfig) -> Self {
        let world = SimWorld::with_seed(seed);
        Self {
            env: SimEnv::with_seed(seed),
            server: SimKeyServer::new(world.clone()),
            world,
            notifier: RecordingNotifier::new(),
            config,
        }
    }

    /// Member keyer acting as `uid`.
    pub fn member(&self, uid: UserId) -> SimMember {
        let teams = Arc::new(self.world.team_loader(uid));
        let ctx = MemberContext {
            teams: teams.clone(),
            users: Arc::new(self.world.user_directory()),
            server: Arc::new(self.server.clone()),
            notifier: Arc::new(self.notifier.clone()),
        };
        let keyer = Arc::new(MemberKeyer::new(self.env.clone(), ctx, self.config.clone()));
        SimMember { keyer, teams }
    }

    /// Bot keyer acting as `uid` over a fresh in-memory store.
    pub fn bot(&self, uid: UserId) -> SimBot {
        self.bot_with_store(uid, MemoryStore::new())
    }

    /// Bot keyer acting as `uid` over `store`.
    pub fn bot_with_store<S: KeyValueStore>(&self, uid: UserId, store: S) -> SimBot<S> {
        let teams = Arc::new(self.world.team_loader(uid));
        let keyring = Arc::new(self.world.bot_keyring(uid));
        let ctx = BotContext {
            teams: teams.clone(),
            keyring: keyring.clone(),
            server: Arc::new(self.server.clone()),
            notifier: Arc::new(self.notifier.clone()),
        };
        let keyer = Arc::new(BotKeyer::new(
            self.env.clone(),
            ctx,
            store.clone(),
            bot_storage_key(uid),
            &self.config,
        ));
        SimBot { keyer, teams, keyring, store }
    }
}

/// Local storage key for bot `uid`. Stable across restarts of the same bot.
pub fn bot_storage_key(uid: UserId) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    key[..16].copy_from_slice(&uid.to_be_bytes());
    key[16..].copy_from_slice(&uid.to_le_bytes());
    key
}
