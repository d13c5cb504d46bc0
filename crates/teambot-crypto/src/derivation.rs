//! Seed and fingerprint derivation
//!
//! Both functions are pure. Independent members rely on producing
//! byte-identical output without coordination, so the labels below are part
//! of the wire contract.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use x25519_dalek::StaticSecret;

use crate::keys::{KEY_SIZE, KidKeyPair, Seed};

type HmacSha256 = Hmac<Sha256>;

/// Context appended to the HMAC input for seed derivation
const SEED_CONTEXT: &[u8] = b"Derived-Teambot-Key-1";

/// HKDF info for the fingerprint keypair
const KID_KEY_PAIR_LABEL: &[u8] = b"teambot kid keypair v1";

/// Derive the teambot seed for one bot from a team application key.
///
/// The application key is the HMAC key; the message is
/// `bot_uid || application_tag || SEED_CONTEXT`.
///
/// # Security
///
/// - Different bots produce different seeds (bot isolation)
/// - Different applications produce different seeds (key space separation)
/// - Deterministic: same inputs always produce same output
pub fn derive_teambot_seed(
    application_key: &[u8; KEY_SIZE],
    bot_uid: &[u8],
    application: u8,
) -> Seed {
    let Ok(mut mac) = HmacSha256::new_from_slice(application_key) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(bot_uid);
    mac.update(&[application]);
    mac.update(SEED_CONTEXT);

    let mut seed = [0u8; KEY_SIZE];
    seed.copy_from_slice(&mac.finalize().into_bytes());
    Seed::from_bytes(seed)
}

/// Stretch a seed into its fingerprint keypair.
///
/// The public half is the `kid` carried in signed metadata.
pub fn derive_kid_key_pair(seed: &Seed) -> KidKeyPair {
    let hkdf = Hkdf::<Sha256>::new(None, seed.as_bytes());

    let mut secret = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(KID_KEY_PAIR_LABEL, &mut secret) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    KidKeyPair::from_secret(StaticSecret::from(secret))
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_KEY: [u8; 32] = *b"team_application_key_material!!!";

    #[test]
    fn derive_is_deterministic() {
        let seed1 = derive_teambot_seed(&APP_KEY, b"bot-uid", 2);
        let seed2 = derive_teambot_seed(&APP_KEY, b"bot-uid", 2);

        assert_eq!(seed1, seed2, "same inputs must produce same output");
    }

    #[test]
    fn different_bots_produce_different_seeds() {
        let seed_a = derive_teambot_seed(&APP_KEY, b"bot-a", 2);
        let seed_b = derive_teambot_seed(&APP_KEY, b"bot-b", 2);

        assert_ne!(seed_a, seed_b, "different bots must produce different seeds");
    }

    #[test]
    fn different_applications_produce_different_seeds() {
        let chat = derive_teambot_seed(&APP_KEY, b"bot", 2);
        let kvstore = derive_teambot_seed(&APP_KEY, b"bot", 7);

        assert_ne!(chat, kvstore);
    }

    #[test]
    fn different_application_keys_produce_different_seeds() {
        let seed_a = derive_teambot_seed(&[1; 32], b"bot", 2);
        let seed_b = derive_teambot_seed(&[2; 32], b"bot", 2);

        assert_ne!(seed_a, seed_b);
    }

    #[test]
    fn seed_matches_plain_hmac() {
        let mut mac = HmacSha256::new_from_slice(&APP_KEY).unwrap();
        mac.update(b"bot");
        mac.update(&[2]);
        mac.update(b"Derived-Teambot-Key-1");
        let expected = mac.finalize().into_bytes();

        let seed = derive_teambot_seed(&APP_KEY, b"bot", 2);
        assert_eq!(seed.as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn kid_key_pair_is_deterministic() {
        let seed = derive_teambot_seed(&APP_KEY, b"bot", 2);
        let kid1 = derive_kid_key_pair(&seed).kid();
        let kid2 = derive_kid_key_pair(&seed).kid();

        assert_eq!(kid1, kid2);
    }

    #[test]
    fn kid_is_not_the_seed() {
        let seed = derive_teambot_seed(&APP_KEY, b"bot", 2);
        let kid = derive_kid_key_pair(&seed).kid();

        assert_ne!(kid.as_bytes(), seed.as_bytes());
    }

    #[test]
    fn works_with_empty_uid() {
        let seed = derive_teambot_seed(&APP_KEY, &[], 0);
        assert_eq!(seed.as_bytes().len(), 32);
    }
}
