//! Key material types
//!
//! Secret material zeroizes on drop. Public identifiers ([`Kid`]) are plain
//! copyable values.

use std::fmt;

use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Size of seeds, kids and X25519/Ed25519 keys in bytes.
pub const KEY_SIZE: usize = 32;

/// A 32-byte teambot seed.
///
/// This is the secret every member derives for a (team, application,
/// generation, bot) tuple.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed([u8; KEY_SIZE]);

impl Seed {
    /// Wrap raw seed bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a seed from a slice, checking its length.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: bytes.len() }
        })?;
        Ok(Self(array))
    }

    /// Raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}

impl Drop for Seed {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Public key identifier.
///
/// Used both for the fingerprint key derived from a seed and for team
/// signing keys (the Ed25519 verifying key bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Kid([u8; KEY_SIZE]);

impl Kid {
    /// Wrap raw public key bytes.
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Display for Kid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Kid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kid({self})")
    }
}

/// Fingerprint keypair deterministically derived from a [`Seed`].
///
/// Only the public half is ever published. It exists so that anyone holding
/// the seed can prove the seed matches the signed metadata.
pub struct KidKeyPair {
    secret: StaticSecret,
    kid: Kid,
}

impl KidKeyPair {
    pub(crate) fn from_secret(secret: StaticSecret) -> Self {
        let kid = Kid(PublicKey::from(&secret).to_bytes());
        Self { secret, kid }
    }

    /// Public identifier for this keypair.
    pub fn kid(&self) -> Kid {
        self.kid
    }

    /// Secret half.
    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

/// X25519 encryption keypair belonging to a user (the bot's per-user key).
#[derive(Clone)]
pub struct EncryptionKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EncryptionKeyPair {
    /// Build a keypair from 32 secret bytes supplied by the caller.
    pub fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public key bytes.
    pub fn public_bytes(&self) -> [u8; KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Public key as a [`Kid`].
    pub fn kid(&self) -> Kid {
        Kid(self.public.to_bytes())
    }

    /// Secret half.
    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl fmt::Debug for EncryptionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeyPair").field("public", &self.kid()).finish_non_exhaustive()
    }
}
