//! Teambot Cryptographic Primitives
//!
//! Cryptographic building blocks for teambot key distribution. Pure functions
//! with deterministic outputs. Callers provide random bytes for deterministic
//! testing.
//!
//! # Key Lifecycle
//!
//! Every team member holding the application key for a generation derives the
//! same bot seed without talking to anyone else. The seed is stretched into a
//! fingerprint keypair whose public half (the kid) is signed by the team, and
//! the seed itself travels sealed to the bot's personal encryption key.
//!
//! ```text
//! Team Application Key (per application, per generation)
//!        │
//!        ▼
//! HMAC-SHA256(bot uid ‖ application ‖ context) → Seed
//!        │                                        │
//!        ▼                                        ▼
//! HKDF → X25519 fingerprint keypair → Kid    Sealed to bot (X25519 + AEAD)
//!        │
//!        ▼
//! Ed25519 signature by the team signing key over the metadata
//! ```
//!
//! # Security
//!
//! Determinism:
//! - Identical inputs yield byte-identical seeds on every member
//! - Derivation labels are fixed; changing them breaks interoperability
//!
//! Tamper Evidence:
//! - The kid is recomputed from the unsealed seed and compared to the signed
//!   metadata; a mismatch means the box or the metadata was altered
//! - Sealed boxes are authenticated; any flipped byte fails to open
//!
//! Domain Separation:
//! - Seed derivation, kid derivation, sealing and signing each use a distinct
//!   label

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod derivation;
pub mod error;
pub mod keys;
pub mod sealed;
pub mod signing;

pub use derivation::{derive_kid_key_pair, derive_teambot_seed};
pub use error::CryptoError;
pub use keys::{EncryptionKeyPair, KEY_SIZE, Kid, KidKeyPair, Seed};
pub use sealed::{NONCE_SIZE, SealedBox, open, seal};
pub use signing::{SIGNATURE_SIZE, SignedPayload, sign_payload, verify_payload};
