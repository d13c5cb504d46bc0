//! Teambot key distribution.
//!
//! Restricted bot members of a team never hold team secrets of their own.
//! Full members derive a per-bot key from each team application key, seal it
//! to the bot, sign the metadata with the team signing key, and publish it.
//! Bots fetch, verify, and unseal what members published.
//!
//! # Architecture
//!
//! Two keyers with disjoint capabilities, wired to external collaborators
//! through traits:
//!
//! ```text
//!   Member                     Server                     Bot
//!   ──────                     ──────                     ───
//!   MemberKeyer                                           BotKeyer
//!     derive seed                                           fetch
//!     seal to bot  ──publish──▶ first write wins ──fetch──▶ verify signer
//!     sign metadata            (3800 = exists)              unseal, check kid
//!                                                           freshness window
//!        ▲                                                     │
//!        └────────────── "key needed" notification ────────────┘
//! ```
//!
//! Across processes nothing is locked. Every member derives byte-identical
//! seeds, the server keeps the first valid publish for a generation, and a
//! publisher that raced with a team or bot key change retries against fresh
//! state.
//!
//! # Components
//!
//! - [`MemberKeyer`]: derive, seal, sign, publish (bounded race retry)
//! - [`BotKeyer`]: latest-usable and exact-generation lookups
//! - [`WrongKidTracker`]: freshness window for keys signed by a superseded
//!   team key
//! - [`TieredKeyCache`]: volatile LRU over an encrypted persistent store
//! - [`NotificationHandler`]: routes incoming notifications to the keyers
//! - [`Environment`]: injected clock and randomness

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod boxing;
pub mod bot_keyer;
pub mod cache;
pub mod config;
pub mod env;
pub mod error;
pub mod handler;
pub mod keyring;
pub mod lock_table;
pub mod member_keyer;
pub mod notify;
pub mod sig;
pub mod storage;
pub mod system_env;
pub mod team;
pub mod transport;
pub mod types;
pub mod wrong_kid;

pub use bot_keyer::{BotContext, BotKeyer};
pub use cache::{CacheKey, CachedKey, TieredKeyCache, VolatileCache};
pub use config::KeyerConfig;
pub use env::Environment;
pub use error::TeambotError;
pub use handler::NotificationHandler;
pub use keyring::{BotKeyring, UserEncryptionKey, UserKeyDirectory};
pub use member_keyer::{MemberContext, MemberKeyer};
pub use notify::{Notifier, TeambotNotification};
pub use sig::{VerifiedMetadata, sign_metadata, verify_against_latest_team_key, verify_metadata};
pub use storage::{EncryptedStore, KeyValueStore, MemoryStore, RedbStore, StorageError};
pub use system_env::SystemEnv;
pub use team::{TeamLoader, TeamSnapshot};
pub use transport::{BoxedKeyEnvelope, KeyRequest, KeyServer, PublishOutcome, ServerStatus};
pub use types::{
    Application, ApplicationKey, PukGeneration, TeamId, TeambotKey, TeambotKeyBoxed,
    TeambotKeyGeneration, TeambotKeyMetadata, UserId,
};
pub use wrong_kid::{WrongKidCheck, WrongKidKey, WrongKidTracker};
