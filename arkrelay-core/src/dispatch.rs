//! C4 Event Dispatcher — classifies inbound relay events and routes them
//! to C5 (intents, service requests), C6 (signing responses), or the
//! ceremony waiter (spec.md §4.4).

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use arkrelay_relay::{EventKind, IntentPayload, RelayEvent, SigningResponsePayload};
use arkrelay_store::SessionType;

use crate::challenge::ChallengeManager;
use crate::logging::LOG_DISPATCH;
use crate::orchestrator::SigningOrchestrator;
use crate::session::SessionManager;
use crate::waiter::ResponseWaiter;

const SERVICE_TYPE_PREFIX: &str = "service:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Intent,
    SigningResponse,
    ServiceRequest,
    Other,
}

fn classify(event: &RelayEvent) -> Classification {
    match event.kind {
        EventKind::SigningResponse => Classification::SigningResponse,
        EventKind::Intent => {
            let is_service = event
                .content
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.starts_with(SERVICE_TYPE_PREFIX));
            if is_service {
                Classification::ServiceRequest
            } else {
                Classification::Intent
            }
        }
        _ => Classification::Other,
    }
}

/// Maps an intent's `type` field to a [`SessionType`]. Unrecognized types
/// fall through to `protocol_op`, the generic solver path (spec §6
/// "Intent schema constraints", §9 "Dynamic dispatch").
fn session_type_for(intent_type: &str) -> SessionType {
    match intent_type {
        "p2p_transfer" => SessionType::P2pTransfer,
        "lightning:lift" => SessionType::LightningLift,
        "lightning:land" => SessionType::LightningLand,
        _ => SessionType::ProtocolOp,
    }
}

pub struct EventDispatcher {
    sessions: Arc<SessionManager>,
    challenges: Arc<ChallengeManager>,
    waiter: Arc<ResponseWaiter>,
    orchestrator: Arc<SigningOrchestrator>,
}

impl EventDispatcher {
    pub fn new(
        sessions: Arc<SessionManager>,
        challenges: Arc<ChallengeManager>,
        waiter: Arc<ResponseWaiter>,
        orchestrator: Arc<SigningOrchestrator>,
    ) -> Self {
        Self {
            sessions,
            challenges,
            waiter,
            orchestrator,
        }
    }

    /// Drains `inbound` forever, spawning one task per event so a slow
    /// ceremony never blocks ingestion of the next event (spec §4.4
    /// "Handoff is non-blocking; long work is queued to a worker pool").
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<RelayEvent>) {
        while let Some(event) = inbound.recv().await {
            let this = self.clone();
            tokio::spawn(async move {
                this.handle(event).await;
            });
        }
        warn!(target: LOG_DISPATCH, "inbound relay channel closed, dispatcher stopping");
    }

    async fn handle(&self, event: RelayEvent) {
        match classify(&event) {
            Classification::Intent => self.handle_intent(event).await,
            Classification::ServiceRequest => self.handle_service_request(event).await,
            Classification::SigningResponse => self.handle_signing_response(event).await,
            Classification::Other => {
                debug!(target: LOG_DISPATCH, event_id = %event.event_id, kind = ?event.kind, "ignoring unclassified event");
            }
        }
    }

    async fn handle_intent(&self, event: RelayEvent) {
        let payload: IntentPayload = match serde_json::from_value(event.content.clone()) {
            Ok(p) => p,
            Err(err) => {
                warn!(target: LOG_DISPATCH, event_id = %event.event_id, error = %err, "malformed intent payload");
                return;
            }
        };

        if payload.expires_at <= Utc::now().timestamp() {
            info!(target: LOG_DISPATCH, event_id = %event.event_id, action_id = %payload.action_id, "dropping expired intent");
            return;
        }

        // Replay check ahead of the store round trip: a duplicate observes
        // the existing session unchanged, never a new ceremony run (spec
        // §8 "Idempotency of intent receipt").
        if let Ok(Some(existing)) = self.sessions.get_by_action(&event.author, &payload.action_id).await {
            info!(target: LOG_DISPATCH, action_id = %payload.action_id, session_id = %existing.session_id, "duplicate intent dropped");
            return;
        }

        let session_type = session_type_for(&payload.intent_type);
        let session = match self
            .sessions
            .accept_intent(
                &event.author,
                &payload.action_id,
                session_type,
                payload.params.clone(),
                event.content.clone(),
                &payload.intent_type,
            )
            .await
        {
            Ok(s) => s,
            Err(err) => {
                warn!(target: LOG_DISPATCH, action_id = %payload.action_id, error = %err, "intent rejected");
                return;
            }
        };

        info!(target: LOG_DISPATCH, session_id = %session.session_id, "starting ceremony");
        self.orchestrator.clone().spawn_ceremony(session.session_id);
    }

    async fn handle_service_request(&self, event: RelayEvent) {
        let Some(session_id) = event.content.get("session_id").and_then(Value::as_str) else {
            warn!(target: LOG_DISPATCH, event_id = %event.event_id, "service request missing session_id");
            return;
        };
        let intent_type = event.content.get("type").and_then(Value::as_str).unwrap_or_default();

        if intent_type == "service:cancel_session" {
            match self.sessions.request_cancel(session_id).await {
                Ok(()) => info!(target: LOG_DISPATCH, session_id, "cancellation requested"),
                Err(err) => warn!(target: LOG_DISPATCH, session_id, error = %err, "cancellation request rejected"),
            }
        } else {
            debug!(target: LOG_DISPATCH, session_id, intent_type, "ignoring unknown service request type");
        }
    }

    async fn handle_signing_response(&self, event: RelayEvent) {
        let payload: SigningResponsePayload = match serde_json::from_value(event.content.clone()) {
            Ok(p) => p,
            Err(err) => {
                warn!(target: LOG_DISPATCH, event_id = %event.event_id, error = %err, "malformed signing response");
                return;
            }
        };

        let session = match self.sessions.get(&payload.session_id).await {
            Ok(s) => s,
            Err(err) => {
                warn!(target: LOG_DISPATCH, session_id = %payload.session_id, error = %err, "response for unknown session");
                return;
            }
        };

        // signing_challenge carries no separate response id; responses are
        // keyed by (session_id, challenge_id), and the challenge_id is
        // looked up as the session's most recent outstanding one.
        let challenge = match self.sessions_latest_challenge(&payload.session_id).await {
            Some(c) => c,
            None => {
                warn!(target: LOG_DISPATCH, session_id = %payload.session_id, "no outstanding challenge for response");
                return;
            }
        };

        let outcome = self
            .challenges
            .verify_response(
                &challenge.challenge_id,
                &session.user_pubkey,
                &payload.payload_ref,
                &payload.signature,
            )
            .await;

        match &outcome {
            Ok(_) => {
                if let Err(err) = self.challenges.unlock_signing(&payload.session_id).await {
                    warn!(target: LOG_DISPATCH, session_id = %payload.session_id, error = %err, "unlock_signing failed");
                }
            }
            Err(err) => {
                warn!(target: LOG_DISPATCH, challenge_id = %challenge.challenge_id, error = %err, "signing response rejected");
            }
        }

        let delivered = self
            .waiter
            .resolve(&challenge.challenge_id, outcome.map(|_| payload))
            .await;
        if !delivered {
            debug!(target: LOG_DISPATCH, challenge_id = %challenge.challenge_id, "no ceremony waiting for this response");
        }
    }

    async fn sessions_latest_challenge(&self, session_id: &str) -> Option<arkrelay_store::SigningChallenge> {
        self.sessions.latest_challenge(session_id).await
    }
}
