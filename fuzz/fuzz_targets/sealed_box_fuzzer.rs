//! Fuzz target for sealed teambot seeds
//!
//! Strategy:
//! - Seal a fuzzer-chosen seed to a fuzzer-chosen recipient
//! - Apply one attack to the encoded box (bit flip, truncation, aad swap,
//!   wrong recipient)
//! - Open the result
//!
//! Invariants:
//! - An untouched box opens to the original plaintext
//! - Any attack is rejected, never decrypted to different bytes
//! - Decoding arbitrary bytes never panics

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use teambot_crypto::{EncryptionKeyPair, SealedBox, open, seal};

#[derive(Debug, Arbitrary)]
enum Attack {
    None,
    FlipBit { position: u16, bit: u8 },
    Truncate { keep: u16 },
    WrongAad { aad: Vec<u8> },
    WrongRecipient { secret: [u8; 32] },
}

#[derive(Debug, Arbitrary)]
struct SealInput {
    recipient: [u8; 32],
    ephemeral: [u8; 32],
    nonce: [u8; 24],
    seed: [u8; 32],
    aad: Vec<u8>,
    attack: Attack,
    raw: Vec<u8>,
}

fuzz_target!(|input: SealInput| {
    if let Ok(parsed) = SealedBox::from_bytes(&input.raw) {
        assert_eq!(parsed.to_bytes(), input.raw);
    }

    let recipient = EncryptionKeyPair::from_secret_bytes(input.recipient);
    let sealed = seal(
        &input.seed,
        &input.aad,
        &recipient.public_bytes(),
        input.ephemeral,
        input.nonce,
    );
    let mut bytes = sealed.to_bytes();

    match input.attack {
        Attack::None => {
            // Low-order recipient points make the shared secret non-contributory
            if let Ok(opened) = open(&sealed, &input.aad, recipient.secret()) {
                assert_eq!(opened, input.seed);
            }
        },
        Attack::FlipBit { position, bit } => {
            let index = usize::from(position) % bytes.len();
            bytes[index] ^= 1 << (bit % 8);
            if let Ok(tampered) = SealedBox::from_bytes(&bytes) {
                assert!(open(&tampered, &input.aad, recipient.secret()).is_err());
            }
        },
        Attack::Truncate { keep } => {
            bytes.truncate(usize::from(keep) % bytes.len());
            if let Ok(truncated) = SealedBox::from_bytes(&bytes) {
                assert!(open(&truncated, &input.aad, recipient.secret()).is_err());
            }
        },
        Attack::WrongAad { aad } => {
            if aad != input.aad {
                assert!(open(&sealed, &aad, recipient.secret()).is_err());
            }
        },
        Attack::WrongRecipient { secret } => {
            let other = EncryptionKeyPair::from_secret_bytes(secret);
            if other.public_bytes() != recipient.public_bytes() {
                assert!(open(&sealed, &input.aad, other.secret()).is_err());
            }
        },
    }
});
