//! Signing and verifying teambot key metadata.
//!
//! Signatures travel base64-encoded alongside the sealed seed. Verification
//! reports who signed; [`verify_against_latest_team_key`] decides whether
//! that signer is the team's current signing key, reloading the team once
//! before declaring the signature stale.

use base64::{Engine, engine::general_purpose::STANDARD};
use ed25519_dalek::SigningKey;
use teambot_crypto::{Kid, SignedPayload, sign_payload, verify_payload};

use crate::{
    error::TeambotError,
    team::TeamLoader,
    types::{TeamId, TeambotKeyMetadata},
};

/// Metadata whose signature verified, and whether the signer was stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMetadata {
    /// The signed metadata
    pub metadata: TeambotKeyMetadata,
    /// True if the signer is not the team's current signing key, even after
    /// an authoritative reload
    pub wrong_kid: bool,
}

/// Sign `metadata` with the team signing key. Returns the base64 signature.
pub fn sign_metadata(
    signing_key: &SigningKey,
    metadata: &TeambotKeyMetadata,
) -> Result<String, TeambotError> {
    let signed = sign_payload(signing_key, &metadata.to_cbor()?);
    Ok(STANDARD.encode(signed.to_bytes()))
}

/// Verify a base64 signature and decode the metadata it carries.
///
/// Returns the signer's kid alongside the metadata.
///
/// # Errors
///
/// - `Serialization` if the base64 or the metadata encoding is invalid
/// - `Crypto` if the signature does not verify
pub fn verify_metadata(signature: &str) -> Result<(Kid, TeambotKeyMetadata), TeambotError> {
    let bytes = STANDARD
        .decode(signature)
        .map_err(|e| TeambotError::Serialization(format!("signature base64: {e}")))?;
    let signed = SignedPayload::from_bytes(&bytes)?;
    let signer = verify_payload(&signed)?;
    let metadata = TeambotKeyMetadata::from_cbor(&signed.payload)?;
    Ok((signer, metadata))
}

/// Verify `signature` and check the signer against the team's latest signing
/// key.
///
/// Uses cached team state first. On a mismatch the team is reloaded from the
/// server once; a signer that still does not match yields
/// `wrong_kid = true` rather than an error.
pub async fn verify_against_latest_team_key(
    teams: &dyn TeamLoader,
    team_id: TeamId,
    signature: &str,
) -> Result<VerifiedMetadata, TeambotError> {
    let (signer, metadata) = verify_metadata(signature)?;

    let team = teams.load(team_id, false).await?;
    if team.signing_kid == signer {
        return Ok(VerifiedMetadata { metadata, wrong_kid: false });
    }

    let team = teams.load(team_id, true).await?;
    let wrong_kid = team.signing_kid != signer;
    if wrong_kid {
        tracing::warn!(
            team_id = %format_args!("{team_id:032x}"),
            generation = metadata.generation,
            application = %metadata.application,
            signer = %signer,
            latest = %team.signing_kid,
            "Teambot key signed by superseded team key"
        );
    }

    Ok(VerifiedMetadata { metadata, wrong_kid })
}
