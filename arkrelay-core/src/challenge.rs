//! C6 Challenge Manager — generates and verifies the signature requests
//! that drive the ceremony's step 4 (spec.md §4.6).
//!
//! The wallet signature verified here is a second, distinct signature from
//! the relay envelope signature C3 already checked: the envelope proves
//! "this event came from the author's relay identity", this proves "the
//! author's L2 key signed exactly these challenge bytes". Grounded on
//! `fedimint_core::secp256k1` usage in `fedimint-dummy-client/src/lib.rs`,
//! generalized here to a direct `secp256k1` dependency since the federation
//! wrapper module has no counterpart in this gateway.

use std::sync::Arc;

use chrono::Utc;
use secp256k1::{schnorr, Message, XOnlyPublicKey, SECP256K1};
use sha2::{Digest, Sha256};
use tracing::info;

use arkrelay_store::{SessionStatus, SigningChallenge, Store};

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::logging::LOG_CHALLENGE;
use crate::session::SessionManager;

pub struct ChallengeManager {
    store: Arc<Store>,
    sessions: Arc<SessionManager>,
}

/// A freshly generated challenge plus the digest the wallet must echo back
/// as `payload_ref` (spec §4.6 "a digest that the wallet can re-derive").
pub struct IssuedChallenge {
    pub challenge: SigningChallenge,
    pub payload_ref: [u8; 32],
}

impl ChallengeManager {
    pub fn new(store: Arc<Store>, sessions: Arc<SessionManager>) -> Self {
        Self { store, sessions }
    }

    /// Creates a challenge for `session_id` over `challenge_data`, the
    /// canonical serialization of the payload the wallet must sign.
    /// `payload_ref` is `sha256(challenge_data)` — deterministic and
    /// re-derivable by the wallet from the same intent without a round
    /// trip (spec §4.6).
    pub async fn generate(
        &self,
        session_id: &str,
        challenge_data: &[u8],
        context: &str,
        step_index: Option<i16>,
        step_total: Option<i16>,
    ) -> OrchestrationResult<IssuedChallenge> {
        let payload_ref = digest(challenge_data);
        let expires_at = Utc::now() + self.sessions.challenge_lifetime();

        let mut tx = self.store.begin().await?;
        let challenge = tx
            .create_challenge(session_id, challenge_data, context, expires_at, step_index, step_total)
            .await?;
        tx.commit().await?;

        info!(target: LOG_CHALLENGE, session_id, challenge_id = %challenge.challenge_id, "challenge issued");
        Ok(IssuedChallenge { challenge, payload_ref })
    }

    /// Verifies a wallet's response per the five steps of spec §4.6 and, on
    /// success, requests `awaiting_signature -> signing` from C5.
    pub async fn verify_response(
        &self,
        challenge_id: &str,
        session_user_pubkey: &str,
        claimed_payload_ref: &str,
        signature_hex: &str,
    ) -> OrchestrationResult<SigningChallenge> {
        let challenge = self
            .store
            .get_challenge(challenge_id)
            .await?
            .ok_or_else(|| OrchestrationError::Validation(format!("unknown challenge {challenge_id}")))?;

        if challenge.is_used {
            return Err(OrchestrationError::BackendConflict(
                "challenge already used".to_string(),
            ));
        }
        if challenge.expires_at < Utc::now() {
            return Err(OrchestrationError::expired("challenge expired"));
        }

        let expected_ref = digest(&challenge.challenge_data);
        let expected_hex = hex::encode(expected_ref);
        if !constant_time_eq(expected_hex.as_bytes(), claimed_payload_ref.as_bytes()) {
            return Err(OrchestrationError::Validation(
                "payload_ref does not match challenge_data".to_string(),
            ));
        }

        verify_schnorr(session_user_pubkey, &expected_ref, signature_hex)?;

        let signature_bytes =
            hex::decode(signature_hex).map_err(|e| OrchestrationError::Validation(e.to_string()))?;

        let mut tx = self.store.begin().await?;
        let used = match tx.use_challenge(challenge_id, &signature_bytes).await {
            Ok(c) => c,
            Err(err) => {
                tx.rollback().await?;
                return Err(err.into());
            }
        };
        tx.commit().await?;

        info!(target: LOG_CHALLENGE, challenge_id, "challenge verified");
        Ok(used)
    }

    /// Requests the session transition that a verified response unlocks.
    /// Kept separate from [`Self::verify_response`] so the orchestrator can
    /// decide whether this is the session's *first* verified response
    /// (which alone drives `awaiting_signature -> signing`) or a later one
    /// within the same `signing` step (spec §4.7 step 4, multiple
    /// challenges per step).
    pub async fn unlock_signing(&self, session_id: &str) -> OrchestrationResult<()> {
        let session = self.sessions.get(session_id).await?;
        if session.status == SessionStatus::AwaitingSignature {
            self.sessions.transition(session_id, SessionStatus::Signing).await?;
        }
        Ok(())
    }
}

fn digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn verify_schnorr(pubkey_hex: &str, msg_digest: &[u8; 32], signature_hex: &str) -> OrchestrationResult<()> {
    let pubkey_bytes =
        hex::decode(pubkey_hex).map_err(|e| OrchestrationError::Validation(format!("bad pubkey: {e}")))?;
    let xonly = XOnlyPublicKey::from_slice(&pubkey_bytes)
        .map_err(|e| OrchestrationError::Validation(format!("bad pubkey: {e}")))?;

    let signature_bytes = hex::decode(signature_hex)
        .map_err(|e| OrchestrationError::signature_invalid(format!("bad signature encoding: {e}")))?;
    let signature = schnorr::Signature::from_slice(&signature_bytes)
        .map_err(|e| OrchestrationError::signature_invalid(format!("malformed signature: {e}")))?;

    let message = Message::from_digest(*msg_digest);
    SECP256K1
        .verify_schnorr(&signature, &message, &xonly)
        .map_err(|_| OrchestrationError::signature_invalid("schnorr verification failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(digest(b"hello"), digest(b"hello"));
        assert_ne!(digest(b"hello"), digest(b"hellp"));
    }

    #[test]
    fn constant_time_eq_matches_semantics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn schnorr_roundtrip_rejects_tampering() {
        let secp = secp256k1::Secp256k1::new();
        let mut rng = secp256k1::rand::thread_rng();
        let (secret_key, _) = secp.generate_keypair(&mut rng);
        let keypair = secp256k1::Keypair::from_secret_key(&secp, &secret_key);
        let (xonly, _) = keypair.x_only_public_key();

        let msg_digest = digest(b"challenge-bytes");
        let message = Message::from_digest(msg_digest);
        let signature = secp.sign_schnorr(&message, &keypair);

        let pubkey_hex = hex::encode(xonly.serialize());
        let sig_hex = hex::encode(signature.as_ref());
        assert!(verify_schnorr(&pubkey_hex, &msg_digest, &sig_hex).is_ok());

        let mut tampered_digest = msg_digest;
        tampered_digest[0] ^= 0xff;
        assert!(verify_schnorr(&pubkey_hex, &tampered_digest, &sig_hex).is_err());
    }
}
