//! Teambot key data model.
//!
//! Three shapes of the same key:
//!
//! - [`TeambotKeyMetadata`]: public, signed by the team, freely distributable
//! - [`TeambotKeyBoxed`]: metadata plus the seed sealed to the bot
//! - [`TeambotKey`]: metadata plus the plaintext seed, usable locally

use std::fmt;

use serde::{Deserialize, Serialize};
use teambot_crypto::{KEY_SIZE, Kid, Seed};
use zeroize::Zeroize;

use crate::error::TeambotError;

/// Team identifier.
pub type TeamId = u128;

/// User identifier; bots are users with a restricted role.
pub type UserId = u128;

/// Teambot key generation, equal to the team key generation it was derived
/// from.
pub type TeambotKeyGeneration = u64;

/// Generation of a user's personal encryption keypair.
pub type PukGeneration = u64;

/// Independent key spaces within one team and generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Application {
    /// Encrypted filesystem
    Kbfs,
    /// Chat messages
    Chat,
    /// Saltpack messages
    Saltpack,
    /// Git repository metadata
    GitMetadata,
    /// Seitan invite tokens
    SeitanInviteToken,
    /// Stellar relay payments
    StellarRelay,
    /// Key-value store
    KvStore,
}

impl Application {
    /// Stable one-byte tag mixed into seed derivation.
    pub fn tag(self) -> u8 {
        match self {
            Self::Kbfs => 1,
            Self::Chat => 2,
            Self::Saltpack => 3,
            Self::GitMetadata => 4,
            Self::SeitanInviteToken => 5,
            Self::StellarRelay => 6,
            Self::KvStore => 7,
        }
    }

    /// Applications for which members create bot keys on membership change.
    pub const BOT_APPLICATIONS: [Self; 2] = [Self::Chat, Self::KvStore];
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Kbfs => "kbfs",
            Self::Chat => "chat",
            Self::Saltpack => "saltpack",
            Self::GitMetadata => "git_metadata",
            Self::SeitanInviteToken => "seitan_invite_token",
            Self::StellarRelay => "stellar_relay",
            Self::KvStore => "kvstore",
        };
        f.write_str(name)
    }
}

/// A team application key at one generation.
///
/// Only full team members can obtain these. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct ApplicationKey {
    /// Which key space this key belongs to
    pub application: Application,
    /// Team key generation
    pub generation: TeambotKeyGeneration,
    key: [u8; KEY_SIZE],
}

impl ApplicationKey {
    /// Wrap raw application key material.
    pub fn new(
        application: Application,
        generation: TeambotKeyGeneration,
        key: [u8; KEY_SIZE],
    ) -> Self {
        Self { application, generation, key }
    }

    /// Raw key material.
    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl fmt::Debug for ApplicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationKey")
            .field("application", &self.application)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Drop for ApplicationKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Public, signed description of a teambot key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeambotKeyMetadata {
    /// Fingerprint derived from the seed
    pub kid: Kid,
    /// Teambot key generation
    pub generation: TeambotKeyGeneration,
    /// The bot this key belongs to
    pub uid: UserId,
    /// Generation of the bot's encryption key the seed was sealed to
    pub puk_generation: PukGeneration,
    /// Key space
    pub application: Application,
}

impl TeambotKeyMetadata {
    /// Canonical CBOR encoding. This is what gets signed and what binds the
    /// sealed seed to its metadata.
    pub fn to_cbor(&self) -> Result<Vec<u8>, TeambotError> {
        let mut bytes = Vec::with_capacity(96);
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| TeambotError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Decode from [`TeambotKeyMetadata::to_cbor`] output.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, TeambotError> {
        ciborium::from_reader(bytes).map_err(|e| TeambotError::Serialization(e.to_string()))
    }
}

/// Metadata plus the seed sealed to the bot's encryption key.
///
/// Not usable without unboxing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeambotKeyBoxed {
    /// Base64 sealed box containing the seed
    pub ciphertext: String,
    /// Metadata the box is bound to
    pub metadata: TeambotKeyMetadata,
}

/// A fully resolved, locally usable teambot key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeambotKey {
    /// The 32-byte secret
    pub seed: Seed,
    /// Signed metadata for this key
    pub metadata: TeambotKeyMetadata,
}

impl TeambotKey {
    /// Key generation.
    pub fn generation(&self) -> TeambotKeyGeneration {
        self.metadata.generation
    }

    /// Secret key material.
    pub fn material(&self) -> &[u8; KEY_SIZE] {
        self.seed.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> TeambotKeyMetadata {
        TeambotKeyMetadata {
            kid: Kid::from_bytes([9; KEY_SIZE]),
            generation: 3,
            uid: u128::MAX - 5,
            puk_generation: 2,
            application: Application::KvStore,
        }
    }

    #[test]
    fn application_tags_are_distinct() {
        let all = [
            Application::Kbfs,
            Application::Chat,
            Application::Saltpack,
            Application::GitMetadata,
            Application::SeitanInviteToken,
            Application::StellarRelay,
            Application::KvStore,
        ];
        let mut tags: Vec<u8> = all.iter().map(|a| a.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), all.len());
    }

    #[test]
    fn metadata_cbor_roundtrip() {
        let original = metadata();
        let decoded = TeambotKeyMetadata::from_cbor(&original.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn metadata_encoding_is_deterministic() {
        assert_eq!(metadata().to_cbor().unwrap(), metadata().to_cbor().unwrap());
    }

    #[test]
    fn garbage_metadata_is_rejected() {
        let result = TeambotKeyMetadata::from_cbor(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(TeambotError::Serialization(_))));
    }

    #[test]
    fn application_key_debug_hides_material() {
        let key = ApplicationKey::new(Application::Chat, 1, [0xAB; KEY_SIZE]);
        let debug = format!("{key:?}");
        assert!(!debug.contains("171"));
        assert!(debug.contains("Chat"));
    }
}
