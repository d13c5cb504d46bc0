//! Encryption at rest on top of any [`KeyValueStore`].
//!
//! Every value is sealed with `XChaCha20-Poly1305` under a caller-supplied
//! storage key. The entry's key string is bound as associated data so a value
//! copied under another key fails to open.
//!
//! # Format
//!
//! ```text
//! version (1) ‖ nonce (24) ‖ ciphertext + tag
//! ```

use std::fmt;

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use teambot_crypto::{KEY_SIZE, NONCE_SIZE};
use zeroize::Zeroizing;

use super::{KeyValueStore, StorageError};
use crate::env::Environment;

const ENCRYPTED_VALUE_VERSION: u8 = 1;

const HEADER_SIZE: usize = 1 + NONCE_SIZE;

/// A [`KeyValueStore`] that encrypts values before handing them to `S`.
///
/// Keys are stored in the clear; only values are sealed.
#[derive(Clone)]
pub struct EncryptedStore<S, E> {
    inner: S,
    env: E,
    storage_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl<S: KeyValueStore, E: Environment> EncryptedStore<S, E> {
    /// Wrap `inner`, sealing values under `storage_key`.
    pub fn new(inner: S, env: E, storage_key: [u8; KEY_SIZE]) -> Self {
        Self { inner, env, storage_key: Zeroizing::new(storage_key) }
    }

    /// The underlying store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new((&*self.storage_key).into())
    }

    fn seal(&self, key: &str, value: &[u8]) -> Result<Vec<u8>, StorageError> {
        let nonce: [u8; NONCE_SIZE] = self.env.random_array();
        let ciphertext = self
            .cipher()
            .encrypt(XNonce::from_slice(&nonce), Payload { msg: value, aad: key.as_bytes() })
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        out.push(ENCRYPTED_VALUE_VERSION);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, key: &str, sealed: &[u8]) -> Result<Vec<u8>, StorageError> {
        if sealed.len() < HEADER_SIZE {
            return Err(StorageError::Decryption(format!(
                "value under {key} too short: {} bytes",
                sealed.len()
            )));
        }
        if sealed[0] != ENCRYPTED_VALUE_VERSION {
            return Err(StorageError::Decryption(format!(
                "value under {key} has unknown version {}",
                sealed[0]
            )));
        }

        let nonce = XNonce::from_slice(&sealed[1..HEADER_SIZE]);
        self.cipher()
            .decrypt(nonce, Payload { msg: &sealed[HEADER_SIZE..], aad: key.as_bytes() })
            .map_err(|_| StorageError::Decryption(format!("value under {key} failed to open")))
    }
}

impl<S: KeyValueStore, E: Environment> KeyValueStore for EncryptedStore<S, E> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.inner.get(key)? {
            Some(sealed) => self.open(key, &sealed).map(Some),
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let sealed = self.seal(key, value)?;
        self.inner.put(key, &sealed)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        self.inner.delete_prefix(prefix)
    }
}

impl<S, E> fmt::Debug for EncryptedStore<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedStore").finish_non_exhaustive()
    }
}
