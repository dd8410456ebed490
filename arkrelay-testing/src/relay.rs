//! In-memory [`EventPublisher`] recording every publish call, so a test can
//! assert on exactly what the ceremony or sweeper tried to send without a
//! live relay pool.

use async_trait::async_trait;
use tokio::sync::Mutex;

use arkrelay_core::error::{OrchestrationError, OrchestrationResult};
use arkrelay_core::ports::EventPublisher;
use arkrelay_relay::{ConfirmationPayload, FailurePayload, L1CommitmentPayload, SigningChallengePayload};

#[derive(Debug, Clone)]
pub enum PublishedEvent {
    Challenge { recipient: String, payload: SigningChallengePayload },
    Failure { recipient: String, payload: FailurePayload },
    Confirmation { payload: ConfirmationPayload, ref_action_id: String },
    L1Commitment(L1CommitmentPayload),
}

#[derive(Default)]
pub struct FakeRelay {
    published: Mutex<Vec<PublishedEvent>>,
    /// When `true`, every publish call fails with
    /// [`OrchestrationError::Internal`], simulating an all-relays-down
    /// outage.
    pub down: std::sync::atomic::AtomicBool,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<PublishedEvent> {
        self.published.lock().await.clone()
    }

    fn check_down(&self) -> OrchestrationResult<()> {
        if self.down.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(OrchestrationError::Internal("relay unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for FakeRelay {
    async fn publish_challenge(
        &self,
        recipient: &str,
        payload: &SigningChallengePayload,
    ) -> OrchestrationResult<String> {
        self.check_down()?;
        self.published.lock().await.push(PublishedEvent::Challenge {
            recipient: recipient.to_string(),
            payload: payload.clone(),
        });
        Ok(format!("evt-{}", payload.session_id))
    }

    async fn publish_failure(&self, recipient: &str, payload: &FailurePayload) -> OrchestrationResult<String> {
        self.check_down()?;
        self.published.lock().await.push(PublishedEvent::Failure {
            recipient: recipient.to_string(),
            payload: payload.clone(),
        });
        Ok(format!("evt-{}", payload.ref_action_id))
    }

    async fn publish_confirmation(
        &self,
        payload: &ConfirmationPayload,
        ref_action_id: &str,
    ) -> OrchestrationResult<String> {
        self.check_down()?;
        self.published.lock().await.push(PublishedEvent::Confirmation {
            payload: payload.clone(),
            ref_action_id: ref_action_id.to_string(),
        });
        Ok(format!("evt-{ref_action_id}"))
    }

    async fn publish_l1_commitment(&self, payload: &L1CommitmentPayload) -> OrchestrationResult<String> {
        self.check_down()?;
        let id = format!("evt-{}", payload.batch_id);
        self.published.lock().await.push(PublishedEvent::L1Commitment(payload.clone()));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arkrelay_relay::ChallengeKind;
    use std::sync::atomic::Ordering;

    fn sample_challenge(session_id: &str) -> SigningChallengePayload {
        SigningChallengePayload {
            session_id: session_id.to_string(),
            challenge_type: ChallengeKind::SignTx,
            payload_to_sign: "deadbeef".to_string(),
            payload_ref: "ref-1".to_string(),
            algo: "schnorr".to_string(),
            domain: "arkrelay".to_string(),
            context: "p2p_transfer".to_string(),
            step_index: Some(1),
            step_total: Some(6),
            expires_at: 0,
        }
    }

    #[tokio::test]
    async fn records_published_events() {
        let relay = FakeRelay::new();
        relay.publish_challenge("npub1", &sample_challenge("sess-1")).await.unwrap();
        let published = relay.published().await;
        assert_eq!(published.len(), 1);
        match &published[0] {
            PublishedEvent::Challenge { recipient, payload } => {
                assert_eq!(recipient, "npub1");
                assert_eq!(payload.session_id, "sess-1");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn down_flag_fails_every_publish() {
        let relay = FakeRelay::new();
        relay.down.store(true, Ordering::Relaxed);
        let err = relay.publish_challenge("npub1", &sample_challenge("sess-1")).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Internal(_)));
        assert!(relay.published().await.is_empty());
    }
}
