//! Registry error types.

use teambot_core::{ServerStatus, StorageError};
use thiserror::Error;

/// Errors returned by [`crate::KeyRegistry`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Request was refused with a wire status the client understands
    #[error("rejected with status {}: {message}", status.code())]
    Rejected {
        /// Wire status
        status: ServerStatus,
        /// Human readable reason
        message: String,
    },

    /// Backing store failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RegistryError {
    pub(crate) fn rejected(status: ServerStatus, message: impl Into<String>) -> Self {
        Self::Rejected { status, message: message.into() }
    }

    /// Wire status for this error. Storage failures have no dedicated status
    /// and report as an internal error (218).
    pub fn status(&self) -> ServerStatus {
        match self {
            Self::Rejected { status, .. } => *status,
            Self::Storage(_) => ServerStatus::Other(218),
        }
    }

    /// Returns true if the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Io(_)))
    }
}
