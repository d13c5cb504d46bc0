//! Coordinating server registry for teambot keys.
//!
//! Members publish sealed, signed teambot keys here; bots fetch them. The
//! registry validates every publish against the server's view of the team
//! and keeps exactly one canonical record per (team, bot, application,
//! generation).
//!
//! # Components
//!
//! - [`KeyRegistry`]: publish validation, fetch, test delete
//! - [`Storage`]: synchronous persistence with atomic insert-if-absent and
//!   compare-and-swap replace
//! - [`ServerTeamView`]: read-only team and user state

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod registry;
pub mod storage;
pub mod team_view;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use registry::KeyRegistry;
pub use storage::{
    ChaoticStorage, MemoryStorage, RecordId, RedbStorage, Storage, StorageError, StoredTeambotKey,
};
pub use team_view::{ServerTeamView, TeamRecord};
