//! C5 Session Manager — sole mutator of [`SigningSession`] state (spec.md
//! §4.5). Every other component requests a transition and receives
//! success/failure; nobody else writes to `signing_sessions` directly.
//!
//! Grounded on the classify-then-dispatch-to-state-machine shape of
//! `gateway_module_v2/mod.rs`: that module's `GatewayClientStateMachinesV2`
//! owns its own transition table the same way this owns §4.5's graph.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use tracing::{info, warn};

use arkrelay_relay::FailurePayload;
use arkrelay_store::{SessionStatus, SessionType, SigningChallenge, SigningSession, Store};

use crate::error::{FailureCode, OrchestrationError, OrchestrationResult};
use crate::logging::LOG_SESSION;
use crate::ports::EventPublisher;

/// Session lifetime default per spec §4.5.
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 30 * 60;
/// Challenge lifetime default per spec §4.5.
pub const DEFAULT_CHALLENGE_LIFETIME_SECS: i64 = 5 * 60;
/// Soft admission ceiling per spec §5.
pub const DEFAULT_ADMISSION_CEILING: i64 = 100;
/// Sweep cadence; spec names the sweeper but leaves the interval
/// unspecified (SPEC_FULL.md §2 supplements a concrete value).
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub struct SessionManager {
    store: Arc<Store>,
    publisher: Arc<dyn EventPublisher>,
    session_lifetime: ChronoDuration,
    challenge_lifetime: ChronoDuration,
    admission_ceiling: i64,
}

impl SessionManager {
    pub fn new(store: Arc<Store>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            publisher,
            session_lifetime: ChronoDuration::seconds(DEFAULT_SESSION_LIFETIME_SECS),
            challenge_lifetime: ChronoDuration::seconds(DEFAULT_CHALLENGE_LIFETIME_SECS),
            admission_ceiling: DEFAULT_ADMISSION_CEILING,
        }
    }

    pub fn challenge_lifetime(&self) -> ChronoDuration {
        self.challenge_lifetime
    }

    /// Creates (or returns the existing) session for `(user_pubkey,
    /// action_id)`, enforcing the admission ceiling of spec §5. Replaying
    /// the same action_id never counts twice against the ceiling since
    /// [`arkrelay_store::StoreTx::create_session`] is itself idempotent.
    #[allow(clippy::too_many_arguments)]
    pub async fn accept_intent(
        &self,
        user_pubkey: &str,
        action_id: &str,
        session_type: SessionType,
        intent_data: Value,
        intent_envelope: Value,
        context: &str,
    ) -> OrchestrationResult<SigningSession> {
        if let Some(existing) = self.store.get_session_by_action(user_pubkey, action_id).await? {
            return Ok(existing);
        }

        let in_flight = self.store.count_non_terminal_sessions().await?;
        if in_flight >= self.admission_ceiling {
            return Err(OrchestrationError::Precondition {
                code: FailureCode::BackendUnavailable,
                message: "gateway at capacity, try again later".to_string(),
            });
        }

        let expires_at = Utc::now() + self.session_lifetime;
        let mut tx = self.store.begin().await?;
        let session = tx
            .create_session(
                user_pubkey,
                action_id,
                session_type,
                intent_data,
                intent_envelope,
                context,
                expires_at,
            )
            .await?;
        tx.commit().await?;
        info!(target: LOG_SESSION, session_id = %session.session_id, user_pubkey, action_id, "session accepted");
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> OrchestrationResult<SigningSession> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| OrchestrationError::Validation(format!("unknown session {session_id}")))
    }

    /// The most recently issued challenge for `session_id`, used by C4 to
    /// resolve which outstanding challenge a `signing_response` answers.
    pub async fn latest_challenge(&self, session_id: &str) -> Option<SigningChallenge> {
        self.store.latest_challenge_for_session(session_id).await.ok().flatten()
    }

    pub async fn get_by_action(
        &self,
        user_pubkey: &str,
        action_id: &str,
    ) -> OrchestrationResult<Option<SigningSession>> {
        Ok(self.store.get_session_by_action(user_pubkey, action_id).await?)
    }

    /// Requests `session_id -> to`. Returns [`OrchestrationError::Internal`]
    /// (via the `StoreError` conversion) if the edge is illegal — C5 never
    /// silently coerces an illegal request into a no-op.
    pub async fn transition(&self, session_id: &str, to: SessionStatus) -> OrchestrationResult<SigningSession> {
        let mut tx = self.store.begin().await?;
        let updated = match tx.transition_session(session_id, to).await {
            Ok(s) => s,
            Err(err) => {
                tx.rollback().await?;
                return Err(err.into());
            }
        };
        tx.commit().await?;
        info!(target: LOG_SESSION, session_id, to = %to, "session transitioned");
        Ok(updated)
    }

    pub async fn set_last_completed_step(&self, session_id: &str, step: i16) -> OrchestrationResult<()> {
        let mut tx = self.store.begin().await?;
        tx.set_last_completed_step(session_id, step).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_result(
        &self,
        session_id: &str,
        result_data: Value,
        signed_tx: Option<&str>,
    ) -> OrchestrationResult<()> {
        let mut tx = self.store.begin().await?;
        tx.set_result(session_id, result_data, signed_tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Cooperative cancellation (spec §4.7 "Cancellation"). Rejects if the
    /// session is already terminal — finalization, once committed, cannot
    /// be retroactively cancelled.
    pub async fn request_cancel(&self, session_id: &str) -> OrchestrationResult<()> {
        let session = self.get(session_id).await?;
        if session.status.is_terminal() {
            return Err(OrchestrationError::Validation(
                "cannot cancel a terminal session".to_string(),
            ));
        }
        let mut tx = self.store.begin().await?;
        tx.request_cancel(session_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Runs forever, sweeping expired sessions every [`SWEEP_INTERVAL`].
    /// Intended to be spawned once at startup and aborted on shutdown.
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_once(Utc::now()).await {
                warn!(target: LOG_SESSION, error = %err, "session sweep pass failed");
            }
        }
    }

    async fn sweep_once(&self, now: DateTime<Utc>) -> OrchestrationResult<()> {
        let expired = self.store.list_expired_sessions(now).await?;
        for session in expired {
            let mut tx = self.store.begin().await?;
            let result = tx.transition_session(&session.session_id, SessionStatus::Expired).await;
            match result {
                Ok(_) => tx.commit().await?,
                Err(err) => {
                    tx.rollback().await?;
                    warn!(target: LOG_SESSION, session_id = %session.session_id, error = %err, "sweep transition failed");
                    continue;
                }
            }

            info!(target: LOG_SESSION, session_id = %session.session_id, "session expired by sweeper");

            let payload = FailurePayload {
                status: "failure".to_string(),
                code: FailureCode::Expired.code(),
                message: "session expired before completion".to_string(),
                ref_action_id: session.action_id.clone(),
            };
            if let Err(err) = self.publisher.publish_failure(&session.user_pubkey, &payload).await {
                warn!(target: LOG_SESSION, session_id = %session.session_id, error = %err, "failed to publish expiry notice");
            }
        }
        Ok(())
    }
}
