//! Fuzz target for signed teambot key metadata
//!
//! Feeds arbitrary bytes through every decoding step a bot performs on the
//! `signature` field of a published record:
//! - `SignedPayload::from_bytes` on the raw envelope
//! - Ed25519 verification against an attacker-chosen signer
//! - CBOR decoding of the metadata
//! - The base64 front door used by `verify_metadata`
//!
//! Invariants:
//! - Nothing panics
//! - A decoded envelope re-encodes to exactly the input bytes
//! - Random bytes never verify

#![no_main]

use base64::{Engine, engine::general_purpose::STANDARD};
use libfuzzer_sys::fuzz_target;
use teambot_core::{TeambotKeyMetadata, verify_metadata};
use teambot_crypto::{SignedPayload, verify_payload};

fuzz_target!(|data: &[u8]| {
    if let Ok(signed) = SignedPayload::from_bytes(data) {
        assert_eq!(signed.to_bytes(), data, "envelope encoding is not canonical");
        assert!(verify_payload(&signed).is_err(), "random envelope verified");
    }

    if let Ok(metadata) = TeambotKeyMetadata::from_cbor(data)
        && let Ok(encoded) = metadata.to_cbor()
    {
        let decoded = TeambotKeyMetadata::from_cbor(&encoded).expect("re-encoded metadata decodes");
        assert_eq!(decoded, metadata);
    }

    let _ = verify_metadata(&STANDARD.encode(data));
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = verify_metadata(text);
    }
});
