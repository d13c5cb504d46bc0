//! Property-based tests for teambot primitives
//!
//! These tests verify the invariants members rely on when they publish
//! independently:
//!
//! 1. **Determinism**: the same (application key, bot, application) always
//!    yields the same seed and kid
//! 2. **Round-trip**: open(seal(seed)) == seed for every recipient
//! 3. **Tamper rejection**: flipping any byte of a sealed box or signed
//!    payload is detected

use ed25519_dalek::SigningKey;
use proptest::prelude::*;
use teambot_crypto::{
    EncryptionKeyPair, SealedBox, SignedPayload, derive_kid_key_pair, derive_teambot_seed, open,
    seal, sign_payload, verify_payload,
};

fn key32() -> impl Strategy<Value = [u8; 32]> {
    prop::collection::vec(any::<u8>(), 32..=32).prop_map(|v| {
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&v);
        arr
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_derivation_deterministic(
        app_key in key32(),
        uid in prop::collection::vec(any::<u8>(), 0..32),
        application in any::<u8>(),
    ) {
        let seed1 = derive_teambot_seed(&app_key, &uid, application);
        let seed2 = derive_teambot_seed(&app_key, &uid, application);
        prop_assert_eq!(seed1.as_bytes(), seed2.as_bytes());
        prop_assert_eq!(derive_kid_key_pair(&seed1).kid(), derive_kid_key_pair(&seed2).kid());
    }

    #[test]
    fn prop_seal_open_roundtrip(
        recipient_secret in key32(),
        ephemeral in key32(),
        nonce in prop::collection::vec(any::<u8>(), 24..=24),
        seed in key32(),
    ) {
        let recipient = EncryptionKeyPair::from_secret_bytes(recipient_secret);
        let mut nonce_arr = [0u8; 24];
        nonce_arr.copy_from_slice(&nonce);

        let sealed = seal(&seed, b"aad", &recipient.public_bytes(), ephemeral, nonce_arr);
        let opened = open(&sealed, b"aad", recipient.secret());

        prop_assert_eq!(opened.unwrap(), seed.to_vec());
    }

    #[test]
    fn prop_sealed_box_tamper_detected(
        recipient_secret in key32(),
        ephemeral in key32(),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let recipient = EncryptionKeyPair::from_secret_bytes(recipient_secret);
        let sealed = seal(&[0x5A; 32], b"", &recipient.public_bytes(), ephemeral, [7; 24]);
        let mut bytes = sealed.to_bytes();

        // Skip the version byte: changing it is a decode failure, covered
        // separately.
        let i = 1 + index.index(bytes.len() - 1);
        bytes[i] ^= flip;

        let decoded = SealedBox::from_bytes(&bytes).unwrap();
        prop_assert!(open(&decoded, b"", recipient.secret()).is_err());
    }

    #[test]
    fn prop_signed_payload_tamper_detected(
        signing_secret in key32(),
        payload in prop::collection::vec(any::<u8>(), 1..128),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let key = SigningKey::from_bytes(&signing_secret);
        let mut bytes = sign_payload(&key, &payload).to_bytes();

        let i = 1 + index.index(bytes.len() - 1);
        bytes[i] ^= flip;

        let decoded = SignedPayload::from_bytes(&bytes).unwrap();
        prop_assert!(verify_payload(&decoded).is_err());
    }
}
