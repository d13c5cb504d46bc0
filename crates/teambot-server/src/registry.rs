//! Canonical teambot key registry.
//!
//! Accepts published keys from full members and serves them to bots. The
//! registry is where concurrent publishers converge: every member derives
//! byte-identical seeds, so whichever valid publish lands first becomes the
//! canonical record and every later one is answered with "generation exists".
//!
//! The one exception is a record signed by a team key that has since been
//! rotated out. Bots only tolerate those for a grace period, so a publish
//! signed by the current key replaces it. The replacement is a
//! compare-and-swap against the stale record; of several members re-signing
//! at once, one replaces it and the rest see "generation exists".
//!
//! # Publish validation
//!
//! Checks run in this order, each with its own wire status:
//!
//! | Check                                            | Status                |
//! |--------------------------------------------------|-----------------------|
//! | signature verifies and metadata matches request  | `SigCannotVerify`     |
//! | team exists                                      | `TeamNotFound`        |
//! | signer is the team's current signing key         | `SigWrongKey`         |
//! | 1 <= generation <= team generation               | `BadGeneration`       |
//! | target is a restricted bot member                | `TeamWritePermDenied` |
//! | sealed to the bot's latest encryption key        | `OldBoxedGeneration`  |
//! | no record, or the record's signer is stale       | `GenerationExists`    |

use base64::{Engine, engine::general_purpose::STANDARD};
use teambot_core::{BoxedKeyEnvelope, KeyRequest, ServerStatus, verify_metadata};
use teambot_crypto::{Kid, SealedBox};

use crate::{
    config::RegistryConfig,
    error::RegistryError,
    storage::{RecordId, Storage, StoredTeambotKey},
    team_view::ServerTeamView,
};

/// Validates and stores published teambot keys.
pub struct KeyRegistry<S: Storage, T: ServerTeamView> {
    storage: S,
    teams: T,
    config: RegistryConfig,
}

impl<S: Storage, T: ServerTeamView> KeyRegistry<S, T> {
    /// Create a registry over `storage`, validating against `teams`.
    pub fn new(storage: S, teams: T, config: RegistryConfig) -> Self {
        Self { storage, teams, config }
    }

    /// Backing storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Team and user view used for validation.
    pub fn teams(&self) -> &T {
        &self.teams
    }

    /// Validate and store a published key.
    ///
    /// # Errors
    ///
    /// - `Rejected` with the status from the module table when a check fails
    /// - `Rejected { GenerationExists }` when a record signed by the current
    ///   team key already exists
    /// - `Storage` if the backing store fails
    pub fn publish(
        &self,
        request: &KeyRequest,
        envelope: &BoxedKeyEnvelope,
    ) -> Result<(), RegistryError> {
        let (puk_generation, signer) = self.validate(request, envelope)?;
        let id = RecordId::from(request);
        let record = StoredTeambotKey {
            ciphertext: envelope.ciphertext.clone(),
            signature: envelope.signature.clone(),
            puk_generation,
        };

        if !self.storage.insert_key(&id, &record)? {
            if self.replace_stale(&id, &record, signer)? {
                tracing::info!(
                    team_id = %format_args!("{:032x}", request.team_id),
                    bot = %format_args!("{:032x}", request.uid),
                    application = %request.application,
                    generation = request.generation,
                    puk_generation,
                    "teambot key re-signed"
                );
                return Ok(());
            }

            tracing::debug!(
                team_id = %format_args!("{:032x}", request.team_id),
                bot = %format_args!("{:032x}", request.uid),
                application = %request.application,
                generation = request.generation,
                "teambot key already published"
            );
            return Err(RegistryError::rejected(
                ServerStatus::GenerationExists,
                format!("generation {} already exists", request.generation),
            ));
        }

        tracing::info!(
            team_id = %format_args!("{:032x}", request.team_id),
            bot = %format_args!("{:032x}", request.uid),
            application = %request.application,
            generation = request.generation,
            puk_generation,
            "teambot key published"
        );
        Ok(())
    }

    /// Fetch a published key. `None` if nobody published it yet.
    ///
    /// # Errors
    ///
    /// `Storage` if the backing store fails.
    pub fn fetch(&self, request: &KeyRequest) -> Result<Option<BoxedKeyEnvelope>, RegistryError> {
        let record = self.storage.load_key(&RecordId::from(request))?;
        Ok(record.map(|record| BoxedKeyEnvelope {
            ciphertext: record.ciphertext,
            signature: record.signature,
        }))
    }

    /// Remove a published key. Refused unless test deletes are enabled.
    ///
    /// # Errors
    ///
    /// - `Rejected { TeamWritePermDenied }` when test deletes are disabled
    /// - `Rejected { NotFound }` when there is nothing to delete
    /// - `Storage` if the backing store fails
    pub fn delete_for_test(&self, request: &KeyRequest) -> Result<(), RegistryError> {
        if !self.config.allow_test_delete {
            return Err(RegistryError::rejected(
                ServerStatus::TeamWritePermDenied,
                "test deletes are disabled",
            ));
        }

        if !self.storage.delete_key(&RecordId::from(request))? {
            return Err(RegistryError::rejected(ServerStatus::NotFound, "no such teambot key"));
        }

        tracing::warn!(
            team_id = %format_args!("{:032x}", request.team_id),
            bot = %format_args!("{:032x}", request.uid),
            application = %request.application,
            generation = request.generation,
            "teambot key deleted for test"
        );
        Ok(())
    }

    /// Swap out the record for `id` if it is not signed by `current`.
    ///
    /// A record whose signature no longer verifies is treated as stale.
    fn replace_stale(
        &self,
        id: &RecordId,
        record: &StoredTeambotKey,
        current: Kid,
    ) -> Result<bool, RegistryError> {
        let Some(existing) = self.storage.load_key(id)? else {
            // Deleted since the insert attempt
            return Ok(self.storage.insert_key(id, record)?);
        };

        let existing_signer = verify_metadata(&existing.signature).ok().map(|(signer, _)| signer);
        if existing_signer == Some(current) {
            return Ok(false);
        }

        Ok(self.storage.replace_key(id, &existing, record)?)
    }

    /// Run every publish check. Returns the encryption key generation the
    /// seed was sealed to and the signer, which is the team's current
    /// signing key.
    fn validate(
        &self,
        request: &KeyRequest,
        envelope: &BoxedKeyEnvelope,
    ) -> Result<(u64, Kid), RegistryError> {
        let cannot_verify =
            |message: String| RegistryError::rejected(ServerStatus::SigCannotVerify, message);

        if request.is_ephemeral {
            return Err(cannot_verify("teambot keys are never ephemeral".to_string()));
        }

        let (signer, metadata) =
            verify_metadata(&envelope.signature).map_err(|e| cannot_verify(e.to_string()))?;
        if metadata.uid != request.uid
            || metadata.application != request.application
            || metadata.generation != request.generation
        {
            return Err(cannot_verify("signed metadata does not match request".to_string()));
        }

        STANDARD
            .decode(&envelope.ciphertext)
            .map_err(|e| cannot_verify(format!("ciphertext base64: {e}")))
            .and_then(|bytes| {
                SealedBox::from_bytes(&bytes).map_err(|e| cannot_verify(e.to_string()))
            })?;

        let team = self.teams.team(request.team_id).ok_or_else(|| {
            RegistryError::rejected(
                ServerStatus::TeamNotFound,
                format!("team {:032x} not found", request.team_id),
            )
        })?;

        if signer != team.signing_kid {
            return Err(RegistryError::rejected(
                ServerStatus::SigWrongKey,
                format!("signer {signer} is not the current team signing key"),
            ));
        }

        if request.generation == 0 || request.generation > team.generation {
            return Err(RegistryError::rejected(
                ServerStatus::BadGeneration,
                format!(
                    "generation {} outside 1..={} of the team",
                    request.generation, team.generation
                ),
            ));
        }

        if !team.restricted_bots.contains(&request.uid) {
            return Err(RegistryError::rejected(
                ServerStatus::TeamWritePermDenied,
                format!("user {:032x} is not a restricted bot member", request.uid),
            ));
        }

        let latest_puk = self.teams.latest_puk_generation(request.uid).ok_or_else(|| {
            RegistryError::rejected(
                ServerStatus::TeamWritePermDenied,
                format!("user {:032x} has no encryption key", request.uid),
            )
        })?;
        if metadata.puk_generation < latest_puk {
            return Err(RegistryError::rejected(
                ServerStatus::OldBoxedGeneration,
                format!(
                    "sealed to encryption key generation {}, latest is {latest_puk}",
                    metadata.puk_generation
                ),
            ));
        }

        Ok((metadata.puk_generation, signer))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
    };

    use ed25519_dalek::SigningKey;
    use teambot_core::{
        Application, SystemEnv, TeambotKeyMetadata, boxing::box_seed, sign_metadata,
    };
    use teambot_crypto::{Seed, derive_kid_key_pair};

    use super::*;
    use crate::{storage::MemoryStorage, team_view::TeamRecord};

    const TEAM: u128 = 0x7EA4;
    const BOT: u128 = 0xB07;

    #[derive(Default)]
    struct Teams {
        teams: Mutex<HashMap<u128, TeamRecord>>,
        puks: Mutex<HashMap<u128, u64>>,
    }

    impl ServerTeamView for Teams {
        fn team(&self, team_id: u128) -> Option<TeamRecord> {
            self.teams.lock().unwrap().get(&team_id).cloned()
        }

        fn latest_puk_generation(&self, uid: u128) -> Option<u64> {
            self.puks.lock().unwrap().get(&uid).copied()
        }
    }

    fn signer() -> SigningKey {
        SigningKey::from_bytes(&[5; 32])
    }

    fn signer_kid(key: &SigningKey) -> Kid {
        Kid::from_bytes(key.verifying_key().to_bytes())
    }

    fn registry(config: RegistryConfig) -> KeyRegistry<MemoryStorage, Teams> {
        let teams = Teams::default();
        teams.teams.lock().unwrap().insert(
            TEAM,
            TeamRecord {
                generation: 3,
                signing_kid: signer_kid(&signer()),
                restricted_bots: HashSet::from([BOT]),
            },
        );
        teams.puks.lock().unwrap().insert(BOT, 2);
        KeyRegistry::new(MemoryStorage::new(), teams, config)
    }

    fn envelope(
        key: &SigningKey,
        uid: u128,
        generation: u64,
        puk_generation: u64,
        seed_byte: u8,
    ) -> BoxedKeyEnvelope {
        let seed = Seed::from_bytes([seed_byte; 32]);
        let metadata = TeambotKeyMetadata {
            kid: derive_kid_key_pair(&seed).kid(),
            generation,
            uid,
            puk_generation,
            application: Application::Chat,
        };
        let signature = sign_metadata(key, &metadata).unwrap();
        let boxed = box_seed(&SystemEnv::new(), &seed, metadata, &[9; 32]).unwrap();
        BoxedKeyEnvelope { ciphertext: boxed.ciphertext, signature }
    }

    fn request(generation: u64) -> KeyRequest {
        KeyRequest::new(TEAM, BOT, Application::Chat, generation)
    }

    fn status(result: Result<(), RegistryError>) -> ServerStatus {
        result.unwrap_err().status()
    }

    #[test]
    fn publish_then_fetch() {
        let registry = registry(RegistryConfig::default());
        let sent = envelope(&signer(), BOT, 3, 2, 1);

        registry.publish(&request(3), &sent).unwrap();

        assert_eq!(registry.fetch(&request(3)).unwrap(), Some(sent));
        assert_eq!(registry.fetch(&request(2)).unwrap(), None);
    }

    #[test]
    fn first_publish_wins() {
        let registry = registry(RegistryConfig::default());
        let first = envelope(&signer(), BOT, 3, 2, 1);
        let second = envelope(&signer(), BOT, 3, 2, 1);

        registry.publish(&request(3), &first).unwrap();
        let result = registry.publish(&request(3), &second);

        assert_eq!(status(result), ServerStatus::GenerationExists);
        assert_eq!(registry.fetch(&request(3)).unwrap(), Some(first));
    }

    #[test]
    fn older_generations_are_accepted() {
        let registry = registry(RegistryConfig::default());
        registry.publish(&request(1), &envelope(&signer(), BOT, 1, 2, 1)).unwrap();
    }

    #[test]
    fn rejects_generation_outside_team_range() {
        let registry = registry(RegistryConfig::default());

        let zero = registry.publish(&request(0), &envelope(&signer(), BOT, 0, 2, 1));
        let ahead = registry.publish(&request(4), &envelope(&signer(), BOT, 4, 2, 1));

        assert_eq!(status(zero), ServerStatus::BadGeneration);
        assert_eq!(status(ahead), ServerStatus::BadGeneration);
    }

    #[test]
    fn rejects_stale_signer() {
        let registry = registry(RegistryConfig::default());
        let old = SigningKey::from_bytes(&[6; 32]);

        let result = registry.publish(&request(3), &envelope(&old, BOT, 3, 2, 1));

        assert_eq!(status(result), ServerStatus::SigWrongKey);
    }

    #[test]
    fn rejects_metadata_for_another_request() {
        let registry = registry(RegistryConfig::default());

        let result = registry.publish(&request(3), &envelope(&signer(), BOT, 2, 2, 1));

        assert_eq!(status(result), ServerStatus::SigCannotVerify);
    }

    #[test]
    fn rejects_tampered_signature() {
        let registry = registry(RegistryConfig::default());
        let mut sent = envelope(&signer(), BOT, 3, 2, 1);
        let mut bytes = STANDARD.decode(&sent.signature).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        sent.signature = STANDARD.encode(bytes);

        let result = registry.publish(&request(3), &sent);

        assert_eq!(status(result), ServerStatus::SigCannotVerify);
    }

    #[test]
    fn rejects_unknown_team() {
        let registry = registry(RegistryConfig::default());
        let other_team = KeyRequest::new(TEAM + 1, BOT, Application::Chat, 3);

        let result = registry.publish(&other_team, &envelope(&signer(), BOT, 3, 2, 1));

        assert_eq!(status(result), ServerStatus::TeamNotFound);
    }

    #[test]
    fn rejects_non_bot_target() {
        let registry = registry(RegistryConfig::default());
        let human = 0x4A;
        let target = KeyRequest::new(TEAM, human, Application::Chat, 3);

        let result = registry.publish(&target, &envelope(&signer(), human, 3, 2, 1));

        assert_eq!(status(result), ServerStatus::TeamWritePermDenied);
    }

    #[test]
    fn rejects_outdated_encryption_key() {
        let registry = registry(RegistryConfig::default());

        let result = registry.publish(&request(3), &envelope(&signer(), BOT, 3, 1, 1));

        assert_eq!(status(result), ServerStatus::OldBoxedGeneration);
    }

    #[test]
    fn test_delete_is_gated() {
        let locked = registry(RegistryConfig::default());
        locked.publish(&request(3), &envelope(&signer(), BOT, 3, 2, 1)).unwrap();
        assert_eq!(status(locked.delete_for_test(&request(3))), ServerStatus::TeamWritePermDenied);

        let open = registry(RegistryConfig { allow_test_delete: true });
        open.publish(&request(3), &envelope(&signer(), BOT, 3, 2, 1)).unwrap();
        open.delete_for_test(&request(3)).unwrap();
        assert_eq!(open.fetch(&request(3)).unwrap(), None);
        assert_eq!(status(open.delete_for_test(&request(3))), ServerStatus::NotFound);
    }

    fn rotate_signer(registry: &KeyRegistry<MemoryStorage, Teams>, key: &SigningKey) {
        registry.teams().teams.lock().unwrap().get_mut(&TEAM).unwrap().signing_kid =
            signer_kid(key);
    }

    #[test]
    fn current_signer_replaces_stale_record() {
        let registry = registry(RegistryConfig::default());
        let stale = envelope(&signer(), BOT, 2, 2, 1);
        registry.publish(&request(2), &stale).unwrap();

        let rotated = SigningKey::from_bytes(&[6; 32]);
        rotate_signer(&registry, &rotated);
        let resigned = envelope(&rotated, BOT, 2, 2, 1);
        registry.publish(&request(2), &resigned).unwrap();

        assert_eq!(registry.fetch(&request(2)).unwrap(), Some(resigned.clone()));
        assert_eq!(registry.storage().key_count(), 1);

        // Once current, the record is canonical again
        let again = envelope(&rotated, BOT, 2, 2, 1);
        assert_eq!(status(registry.publish(&request(2), &again)), ServerStatus::GenerationExists);
        assert_eq!(registry.fetch(&request(2)).unwrap(), Some(resigned));
    }

    #[test]
    fn stale_signer_cannot_replace_anything() {
        let registry = registry(RegistryConfig::default());
        let original = envelope(&signer(), BOT, 2, 2, 1);
        registry.publish(&request(2), &original).unwrap();
        rotate_signer(&registry, &SigningKey::from_bytes(&[6; 32]));

        let result = registry.publish(&request(2), &envelope(&signer(), BOT, 2, 2, 1));

        assert_eq!(status(result), ServerStatus::SigWrongKey);
        assert_eq!(registry.fetch(&request(2)).unwrap(), Some(original));
    }
}
