//! Error types for teambot cryptographic operations

use thiserror::Error;

/// Errors from sealing, opening, signing and decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Sealed box failed to open (authentication tag mismatch or wrong key)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// Signature did not verify against the embedded signer
    #[error("signature verification failed")]
    BadSignature,

    /// Invalid key material length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },

    /// Encoded structure is truncated or has an unknown version
    #[error("malformed encoding: {0}")]
    Malformed(String),
}

impl CryptoError {
    /// Returns true if this error is fatal for the data that produced it.
    ///
    /// Every crypto failure is fatal: retrying with the same bytes cannot
    /// succeed.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DecryptionFailed { .. }
            | Self::BadSignature
            | Self::InvalidKeyLength { .. }
            | Self::Malformed(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_errors_are_fatal() {
        assert!(CryptoError::BadSignature.is_fatal());
        assert!(CryptoError::Malformed("short".to_string()).is_fatal());
        assert!(CryptoError::DecryptionFailed { reason: "tag".to_string() }.is_fatal());
    }

    #[test]
    fn error_display() {
        let err = CryptoError::InvalidKeyLength { expected: 32, actual: 7 };
        assert_eq!(err.to_string(), "invalid key length: expected 32, got 7");
    }
}
