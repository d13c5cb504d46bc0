//! Per-user encryption keys.
//!
//! Members seal seeds to a bot's latest public encryption key; the bot opens
//! them with whichever generation of its own keypair the metadata names.

use async_trait::async_trait;
use teambot_crypto::{EncryptionKeyPair, KEY_SIZE};

use crate::{
    error::TeambotError,
    types::{PukGeneration, UserId},
};

/// A user's public encryption key at one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserEncryptionKey {
    /// Keypair generation
    pub generation: PukGeneration,
    /// X25519 public key
    pub public: [u8; KEY_SIZE],
}

/// Member-side lookup of other users' public encryption keys.
#[async_trait]
pub trait UserKeyDirectory: Send + Sync {
    /// Latest known encryption key for `uid`.
    ///
    /// `force_refresh` bypasses any local cache; used after the server
    /// reports the seed was sealed to a stale key.
    async fn latest_encryption_key(
        &self,
        uid: UserId,
        force_refresh: bool,
    ) -> Result<Option<UserEncryptionKey>, TeambotError>;
}

/// The bot's own keyring.
#[async_trait]
pub trait BotKeyring: Send + Sync {
    /// The bot's identity.
    fn uid(&self) -> UserId;

    /// Encryption keypair at `generation`, if held locally.
    async fn encryption_key(
        &self,
        generation: PukGeneration,
    ) -> Result<Option<EncryptionKeyPair>, TeambotError>;

    /// Sync the keyring to pick up newer generations.
    async fn sync(&self) -> Result<(), TeambotError>;
}
