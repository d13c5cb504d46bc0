//! Deterministic simulation harness for teambot key distribution.
//!
//! In-process implementations of every collaborator the keyers depend on:
//!
//! - [`SimEnv`]: manual clock and seeded ChaCha20 randomness
//! - [`SimWorld`]: teams with signing-key rotation, users with encryption
//!   key rotation, and the client-side views that lag behind them
//! - [`SimKeyServer`]: the real registry behind an in-process transport, with
//!   fault injection and request counters
//! - [`RecordingNotifier`]: a notification bus tests can drain, replay, or
//!   drop
//!
//! [`Scenario`] wires them together so a test can stand up several members
//! and bots against one server in a few lines.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scenario;
pub mod sim_env;
pub mod sim_notifier;
pub mod sim_server;
pub mod sim_world;

pub use scenario::{Scenario, SimBot, SimMember, bot_storage_key};
pub use sim_env::{SIM_EPOCH_SECS, SimEnv};
pub use sim_notifier::RecordingNotifier;
pub use sim_server::{InjectedFault, SimKeyServer};
pub use sim_world::{SimBotKeyring, SimTeamLoader, SimUserDirectory, SimWorld};
