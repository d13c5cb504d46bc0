//! Sealed boxes to an X25519 recipient
//!
//! An ephemeral X25519 secret (caller-provided bytes) is combined with the
//! recipient's public key; HKDF turns the shared secret into an
//! `XChaCha20-Poly1305` key. All functions are pure - random bytes must be
//! provided by the caller.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::{error::CryptoError, keys::KEY_SIZE};

/// Size of the `XChaCha20` nonce (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Current encoding version
const SEALED_BOX_VERSION: u8 = 1;

/// HKDF info for the box key
const SEAL_LABEL: &[u8] = b"teambot sealed box v1";

/// Header: version + ephemeral public key + nonce
const HEADER_SIZE: usize = 1 + KEY_SIZE + NONCE_SIZE;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Ciphertext sealed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    /// Sender's ephemeral X25519 public key
    pub ephemeral_public: [u8; KEY_SIZE],
    /// The 24-byte `XChaCha20` nonce
    pub nonce: [u8; NONCE_SIZE],
    /// The ciphertext including 16-byte Poly1305 tag
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Encode as `version || ephemeral_public || nonce || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.ciphertext.len());
        out.push(SEALED_BOX_VERSION);
        out.extend_from_slice(&self.ephemeral_public);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Decode from [`SealedBox::to_bytes`] output.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < HEADER_SIZE + POLY1305_TAG_SIZE {
            return Err(CryptoError::Malformed(format!(
                "sealed box too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != SEALED_BOX_VERSION {
            return Err(CryptoError::Malformed(format!("unknown sealed box version {}", bytes[0])));
        }

        let mut ephemeral_public = [0u8; KEY_SIZE];
        ephemeral_public.copy_from_slice(&bytes[1..=KEY_SIZE]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[1 + KEY_SIZE..HEADER_SIZE]);

        Ok(Self { ephemeral_public, nonce, ciphertext: bytes[HEADER_SIZE..].to_vec() })
    }
}

/// Seal `plaintext` to `recipient_public`.
///
/// `aad` is authenticated but not encrypted; the opener must pass the same
/// bytes.
///
/// # Security
///
/// - Caller MUST provide cryptographically secure random bytes in production
/// - The ephemeral secret is zeroized after use
pub fn seal(
    plaintext: &[u8],
    aad: &[u8],
    recipient_public: &[u8; KEY_SIZE],
    mut ephemeral_secret: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
) -> SealedBox {
    let ephemeral = StaticSecret::from(ephemeral_secret);
    ephemeral_secret.zeroize();
    let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();

    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient_public));
    let mut key = box_key(shared.as_bytes(), &ephemeral_public, recipient_public);

    let cipher = XChaCha20Poly1305::new((&key).into());
    key.zeroize();

    let Ok(ciphertext) =
        cipher.encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
    else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    SealedBox { ephemeral_public, nonce, ciphertext }
}

/// Open a sealed box with the recipient's secret key.
///
/// # Errors
///
/// - `DecryptionFailed`: wrong key, tampered ciphertext, or low-order
///   ephemeral key
pub fn open(
    sealed: &SealedBox,
    aad: &[u8],
    recipient_secret: &StaticSecret,
) -> Result<Vec<u8>, CryptoError> {
    let recipient_public = PublicKey::from(recipient_secret).to_bytes();
    let shared = recipient_secret.diffie_hellman(&PublicKey::from(sealed.ephemeral_public));
    if !shared.was_contributory() {
        return Err(CryptoError::DecryptionFailed {
            reason: "non-contributory ephemeral key".to_string(),
        });
    }

    let mut key = box_key(shared.as_bytes(), &sealed.ephemeral_public, &recipient_public);
    let cipher = XChaCha20Poly1305::new((&key).into());
    key.zeroize();

    cipher
        .decrypt(
            XNonce::from_slice(&sealed.nonce),
            Payload { msg: sealed.ciphertext.as_slice(), aad },
        )
        .map_err(|_| CryptoError::DecryptionFailed { reason: "authentication failed".to_string() })
}

/// Derive the AEAD key, binding both public keys as salt.
fn box_key(
    shared: &[u8; KEY_SIZE],
    ephemeral_public: &[u8; KEY_SIZE],
    recipient_public: &[u8; KEY_SIZE],
) -> [u8; KEY_SIZE] {
    let mut salt = [0u8; 2 * KEY_SIZE];
    salt[..KEY_SIZE].copy_from_slice(ephemeral_public);
    salt[KEY_SIZE..].copy_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(SEAL_LABEL, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    key
}
