//! Sealing seeds to a bot and opening them again.
//!
//! The sealed box is bound to the metadata's canonical encoding as associated
//! data, and the bot recomputes the kid from the unsealed seed. Either check
//! failing means the record was altered; both surface as
//! [`TeambotError::IntegrityFailure`] and are never retried with the same
//! data.

use base64::{Engine, engine::general_purpose::STANDARD};
use teambot_crypto::{
    EncryptionKeyPair, KEY_SIZE, SealedBox, Seed, derive_kid_key_pair, open, seal,
};

use crate::{
    env::Environment,
    error::TeambotError,
    types::{TeambotKey, TeambotKeyBoxed, TeambotKeyMetadata},
};

/// Seal `seed` to `recipient_public`, bound to `metadata`.
pub fn box_seed<E: Environment>(
    env: &E,
    seed: &Seed,
    metadata: TeambotKeyMetadata,
    recipient_public: &[u8; KEY_SIZE],
) -> Result<TeambotKeyBoxed, TeambotError> {
    let aad = metadata.to_cbor()?;
    let sealed =
        seal(seed.as_bytes(), &aad, recipient_public, env.random_array(), env.random_array());

    Ok(TeambotKeyBoxed { ciphertext: STANDARD.encode(sealed.to_bytes()), metadata })
}

/// Open a boxed key with the bot's encryption keypair and check the kid.
///
/// # Errors
///
/// `IntegrityFailure` if the ciphertext does not decode or authenticate, or
/// if the unsealed seed does not reproduce `metadata.kid`.
pub fn unbox(
    boxed: &TeambotKeyBoxed,
    keypair: &EncryptionKeyPair,
) -> Result<TeambotKey, TeambotError> {
    let integrity = |reason: String| TeambotError::IntegrityFailure { reason };

    let bytes = STANDARD
        .decode(&boxed.ciphertext)
        .map_err(|e| integrity(format!("ciphertext base64: {e}")))?;
    let sealed = SealedBox::from_bytes(&bytes).map_err(|e| integrity(e.to_string()))?;

    let aad = boxed.metadata.to_cbor()?;
    let plaintext = open(&sealed, &aad, keypair.secret()).map_err(|e| integrity(e.to_string()))?;
    let seed = Seed::try_from_slice(&plaintext).map_err(|e| integrity(e.to_string()))?;

    let derived = derive_kid_key_pair(&seed).kid();
    if derived != boxed.metadata.kid {
        return Err(integrity(format!(
            "seed derives kid {derived}, metadata says {}",
            boxed.metadata.kid
        )));
    }

    Ok(TeambotKey { seed, metadata: boxed.metadata.clone() })
}
