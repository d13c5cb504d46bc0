//! Attached Ed25519 signatures over small payloads
//!
//! The signer's public key travels with the signature so verification can
//! report who signed; deciding whether that signer is acceptable is the
//! caller's job.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::{
    error::CryptoError,
    keys::{KEY_SIZE, Kid},
};

/// Ed25519 signature size (64 bytes)
pub const SIGNATURE_SIZE: usize = 64;

/// Current encoding version
const SIGNED_PAYLOAD_VERSION: u8 = 1;

/// Prefix mixed into every signed message
const SIGNATURE_CONTEXT: &[u8] = b"teambot key metadata v1\0";

/// Header: version + signer + signature
const HEADER_SIZE: usize = 1 + KEY_SIZE + SIGNATURE_SIZE;

/// A payload with its signer and signature attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// Signer's Ed25519 public key
    pub signer: Kid,
    /// Signature over `SIGNATURE_CONTEXT || payload`
    pub signature: [u8; SIGNATURE_SIZE],
    /// The signed bytes
    pub payload: Vec<u8>,
}

impl SignedPayload {
    /// Encode as `version || signer || signature || payload`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.push(SIGNED_PAYLOAD_VERSION);
        out.extend_from_slice(self.signer.as_bytes());
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode from [`SignedPayload::to_bytes`] output. Does not verify.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CryptoError::Malformed(format!(
                "signed payload too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != SIGNED_PAYLOAD_VERSION {
            return Err(CryptoError::Malformed(format!(
                "unknown signed payload version {}",
                bytes[0]
            )));
        }

        let mut signer = [0u8; KEY_SIZE];
        signer.copy_from_slice(&bytes[1..=KEY_SIZE]);
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[1 + KEY_SIZE..HEADER_SIZE]);

        Ok(Self {
            signer: Kid::from_bytes(signer),
            signature,
            payload: bytes[HEADER_SIZE..].to_vec(),
        })
    }
}

/// Sign `payload` with `signing_key`.
pub fn sign_payload(signing_key: &SigningKey, payload: &[u8]) -> SignedPayload {
    let signature = signing_key.sign(&signed_message(payload));
    SignedPayload {
        signer: Kid::from_bytes(signing_key.verifying_key().to_bytes()),
        signature: signature.to_bytes(),
        payload: payload.to_vec(),
    }
}

/// Verify a signed payload against its embedded signer.
///
/// Returns the signer's kid on success.
///
/// # Errors
///
/// - `InvalidKeyLength` if the embedded signer is not a valid Ed25519 point
/// - `BadSignature` if the signature does not verify
pub fn verify_payload(signed: &SignedPayload) -> Result<Kid, CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(signed.signer.as_bytes())
        .map_err(|_| CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: 0 })?;
    let signature = Signature::from_bytes(&signed.signature);

    verifying_key
        .verify_strict(&signed_message(&signed.payload), &signature)
        .map_err(|_| CryptoError::BadSignature)?;

    Ok(signed.signer)
}

fn signed_message(payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(SIGNATURE_CONTEXT.len() + payload.len());
    message.extend_from_slice(SIGNATURE_CONTEXT);
    message.extend_from_slice(payload);
    message
}
