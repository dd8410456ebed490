//! Trait seams between the orchestration engine and its two outward-facing
//! collaborators (the three daemons, already behind C2's own traits, and
//! the relay). The core only ever holds `Arc<dyn EventPublisher>` — never
//! `arkrelay_relay::RelayClient` directly — the same way the teacher's
//! gateway only holds `Arc<dyn ILnRpcClient>` and never a concrete CLN/LND
//! client (`gateway/ln-gateway/src/lightning/mod.rs`). This is what lets
//! `arkrelay-testing` substitute a `FakeRelay` without the core knowing.

use async_trait::async_trait;

use arkrelay_relay::{
    ConfirmationPayload, FailurePayload, L1CommitmentPayload, RelayClient, SigningChallengePayload,
};

use crate::error::{OrchestrationError, OrchestrationResult};

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_challenge(
        &self,
        recipient: &str,
        payload: &SigningChallengePayload,
    ) -> OrchestrationResult<String>;

    async fn publish_failure(&self, recipient: &str, payload: &FailurePayload) -> OrchestrationResult<String>;

    async fn publish_confirmation(
        &self,
        payload: &ConfirmationPayload,
        ref_action_id: &str,
    ) -> OrchestrationResult<String>;

    async fn publish_l1_commitment(&self, payload: &L1CommitmentPayload) -> OrchestrationResult<String>;
}

/// The production implementation: a thin shim over [`RelayClient`] that
/// parses the hex recipient key and maps [`arkrelay_relay::RelayError`]
/// onto [`OrchestrationError`].
#[async_trait]
impl EventPublisher for RelayClient {
    async fn publish_challenge(
        &self,
        recipient: &str,
        payload: &SigningChallengePayload,
    ) -> OrchestrationResult<String> {
        let recipient = parse_pubkey(recipient)?;
        RelayClient::publish_challenge(self, recipient, payload)
            .await
            .map_err(|e| OrchestrationError::Internal(e.to_string()))
    }

    async fn publish_failure(&self, recipient: &str, payload: &FailurePayload) -> OrchestrationResult<String> {
        let recipient = parse_pubkey(recipient)?;
        RelayClient::publish_failure(self, recipient, payload)
            .await
            .map_err(|e| OrchestrationError::Internal(e.to_string()))
    }

    async fn publish_confirmation(
        &self,
        payload: &ConfirmationPayload,
        ref_action_id: &str,
    ) -> OrchestrationResult<String> {
        RelayClient::publish_confirmation(self, payload, ref_action_id)
            .await
            .map_err(|e| OrchestrationError::Internal(e.to_string()))
    }

    async fn publish_l1_commitment(&self, payload: &L1CommitmentPayload) -> OrchestrationResult<String> {
        RelayClient::publish_l1_commitment(self, payload)
            .await
            .map_err(|e| OrchestrationError::Internal(e.to_string()))
    }
}

fn parse_pubkey(hex: &str) -> OrchestrationResult<nostr::PublicKey> {
    nostr::PublicKey::from_hex(hex)
        .map_err(|e| OrchestrationError::Validation(format!("malformed recipient pubkey: {e}")))
}
