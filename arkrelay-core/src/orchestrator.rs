//! C7 Signing Orchestrator — the six-step ceremony that drives a session
//! from `awaiting_signature` to `completed` (spec.md §4.7). The centerpiece
//! of the engine: every other component is a collaborator this one calls
//! in a fixed order.
//!
//! Grounded on `gateway_module_v2/mod.rs`'s state-machine-as-worker-task
//! shape: each ceremony is a `tokio::spawn`ed task whose only persistent
//! state is the session row — a crash loses no more than the in-flight
//! step, and a restarted task picks up from `last_completed_step` the same
//! way `GatewayClientStateMachinesV2` resumes a state machine from its
//! persisted state (spec §9 "Coroutine/async control flow").

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use arkrelay_daemons::ark::{
    ArkTxInput, ArkTxOutput, PrepareArkTxRequest, PrepareCheckpointTxRequest, SigningPayload,
    SubmitSignaturesRequest,
};
use arkrelay_daemons::ArkDaemonRpc;
use arkrelay_relay::{ChallengeKind, ConfirmationPayload, FailurePayload, IntentPayload, SigningChallengePayload};
use arkrelay_store::{NewTransaction, NewVtxo, SessionStatus, SigningSession, Store, StoreTx, TransactionStatus};

use crate::asset::AssetManager;
use crate::challenge::ChallengeManager;
use crate::error::{FailureCode, OrchestrationError, OrchestrationResult};
use crate::intents::{parse_intent, LightningLandParams, LightningLiftParams, P2pTransferParams, ParsedIntent, ProtocolOpParams};
use crate::lightning::LightningManager;
use crate::logging::LOG_CEREMONY;
use crate::ports::EventPublisher;
use crate::session::SessionManager;
use crate::vtxo::VtxoManager;
use crate::waiter::ResponseWaiter;

/// L2 transfer fee, fixed per spec §6 "Fees".
pub const P2P_TRANSFER_FEE_SATS: i64 = 10;
/// Per-step RPC retry budget before a step fails with `backend_unavailable`
/// (spec §4.7 "Steps 2-3: retriable up to N transient daemon errors").
pub const STEP_RETRY_LIMIT: u32 = 3;
const STEP_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Progress markers persisted as `SigningSession.last_completed_step`
/// (spec §9 "Idempotency keys" — `(session_id, step)`).
mod step {
    pub const VALIDATED: i16 = 1;
    pub const ARK_TX_PREPARED: i16 = 2;
    pub const CHECKPOINT_PREPARED: i16 = 3;
    pub const SIGNATURES_COLLECTED: i16 = 4;
    pub const SUBMITTED: i16 = 5;
    pub const FINALIZED: i16 = 6;
}

pub struct SigningOrchestrator {
    store: Arc<Store>,
    ark: Arc<dyn ArkDaemonRpc>,
    sessions: Arc<SessionManager>,
    challenges: Arc<ChallengeManager>,
    vtxos: Arc<VtxoManager>,
    assets: Arc<AssetManager>,
    lightning: Arc<LightningManager>,
    publisher: Arc<dyn EventPublisher>,
    waiter: Arc<ResponseWaiter>,
}

impl SigningOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        ark: Arc<dyn ArkDaemonRpc>,
        sessions: Arc<SessionManager>,
        challenges: Arc<ChallengeManager>,
        vtxos: Arc<VtxoManager>,
        assets: Arc<AssetManager>,
        lightning: Arc<LightningManager>,
        publisher: Arc<dyn EventPublisher>,
        waiter: Arc<ResponseWaiter>,
    ) -> Self {
        Self {
            store,
            ark,
            sessions,
            challenges,
            vtxos,
            assets,
            lightning,
            publisher,
            waiter,
        }
    }

    /// Starts a ceremony for `session_id` on a fresh worker-pool task
    /// (spec §5 "thread-parallel runtime"). Never awaited by the caller —
    /// C4 must stay non-blocking (spec §4.4).
    pub fn spawn_ceremony(self: Arc<Self>, session_id: String) {
        tokio::spawn(async move {
            if let Err(err) = self.run(&session_id).await {
                warn!(target: LOG_CEREMONY, session_id, error = %err, "ceremony ended in failure");
                self.fail_session(&session_id, &err).await;
            }
        });
    }

    async fn run(&self, session_id: &str) -> OrchestrationResult<()> {
        let session = self.sessions.get(session_id).await?;
        if session.status.is_terminal() {
            return Ok(());
        }

        let parsed = parse_intent(session.session_type, &session.intent_data)?;
        match parsed {
            ParsedIntent::P2pTransfer(params) => self.run_transfer_ceremony(&session, params).await,
            ParsedIntent::LightningLift(params) => self.run_lift_ceremony(&session, params).await,
            ParsedIntent::LightningLand(params) => self.run_land_ceremony(&session, params).await,
            ParsedIntent::ProtocolOp(params) => self.run_protocol_op_ceremony(&session, params).await,
        }
    }

    fn check_cancel(&self, session: &SigningSession) -> OrchestrationResult<()> {
        if session.cancel_requested {
            return Err(OrchestrationError::Cancelled);
        }
        Ok(())
    }

    /// Re-checks the signed intent that started this session before a step
    /// is allowed to touch any VTXO. The event's signature was already
    /// verified once, by `nostr-sdk`, when the event entered the relay pool
    /// (`arkrelay_relay::decode_event`); re-parsing `intent_envelope`
    /// against its schema here re-proves that the exact bytes the gateway
    /// is acting on are still the bytes that verified, and the
    /// `action_id`/`expires_at` checks guard against acting on a session
    /// whose envelope has gone stale since intake.
    fn revalidate_intent(&self, session: &SigningSession) -> OrchestrationResult<()> {
        let envelope: IntentPayload = serde_json::from_value(session.intent_envelope.clone())
            .map_err(|e| OrchestrationError::Validation(format!("intent envelope no longer matches its schema: {e}")))?;

        // The envelope is the exact content that `nostr-sdk` verified the
        // signature over at intake; if it no longer agrees with the
        // session it was supposed to start, treat the session as resting
        // on an intent that can no longer be proven authentic.
        if envelope.action_id != session.action_id {
            return Err(OrchestrationError::invalid_author_signature(
                "intent envelope no longer matches the session it started",
            ));
        }
        if envelope.expires_at <= Utc::now().timestamp() {
            return Err(OrchestrationError::expired("intent expired before its ceremony step ran"));
        }
        Ok(())
    }

    fn step_deadline(&self, session: &SigningSession) -> std::time::Instant {
        let remaining = (session.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        std::time::Instant::now() + remaining
    }

    // ---- p2p_transfer: the full six-step ceremony ------------------------

    async fn run_transfer_ceremony(&self, session: &SigningSession, params: P2pTransferParams) -> OrchestrationResult<()> {
        let session_id = session.session_id.clone();

        self.step1_validate_transfer(session, &params).await?;
        self.sessions.set_last_completed_step(&session_id, step::VALIDATED).await?;

        let assigned = self.vtxos.assign(&session.user_pubkey, &params.asset_id, params.amount + params.fee).await?;
        let inputs: Vec<ArkTxInput> = assigned
            .iter()
            .map(|v| ArkTxInput { vtxo_id: v.vtxo_id.clone(), script_pubkey: v.script_pubkey.clone() })
            .collect();
        let outputs = vec![ArkTxOutput {
            script_pubkey: params.recipient.clone(),
            amount_sats: params.amount as u64,
        }];

        let ark_tx = self
            .retry_daemon_call(&session_id, "prepare_ark_tx", || {
                self.ark.prepare_ark_tx(PrepareArkTxRequest { inputs: inputs.clone(), outputs: outputs.clone() })
            })
            .await?;
        self.sessions.set_last_completed_step(&session_id, step::ARK_TX_PREPARED).await?;

        let checkpoint = self
            .retry_daemon_call(&session_id, "prepare_checkpoint_tx", || {
                self.ark.prepare_checkpoint_tx(PrepareCheckpointTxRequest { unsigned_ark_tx: ark_tx.unsigned_ark_tx.clone() })
            })
            .await?;
        self.sessions.set_last_completed_step(&session_id, step::CHECKPOINT_PREPARED).await?;

        let mut all_payloads = ark_tx.signing_payloads.clone();
        all_payloads.extend(checkpoint.signing_payloads.clone());

        let signatures = self.collect_signatures(session, &all_payloads, &params.asset_id).await?;
        self.sessions.set_last_completed_step(&session_id, step::SIGNATURES_COLLECTED).await?;

        // A daemon-reported conflict here is not transient (spec §4.7 step
        // 5) — `retry_daemon_call` only retries `BackendUnavailable`, so a
        // conflict still surfaces immediately.
        let submitted = self
            .retry_daemon_call(&session_id, "submit_signatures", || {
                self.ark.submit_signatures(SubmitSignaturesRequest {
                    unsigned_ark_tx: ark_tx.unsigned_ark_tx.clone(),
                    checkpoint_txs: checkpoint.checkpoint_txs.clone(),
                    signatures: signatures.clone(),
                })
            })
            .await?;
        self.sessions.set_last_completed_step(&session_id, step::SUBMITTED).await?;

        let vtxo_ids: Vec<String> = assigned.iter().map(|v| v.vtxo_id.clone()).collect();
        let output_vtxo = NewVtxo {
            vtxo_id: format!("out-{}", Uuid::new_v4()),
            txid: submitted.txid.clone(),
            vout: 0,
            amount_sats: params.amount,
            script_pubkey: params.recipient.clone(),
            asset_id: params.asset_id.clone(),
            user_pubkey: Some(params.recipient.clone()),
            expires_at: session.expires_at,
        };

        self.finalize(
            session,
            &submitted.txid,
            "p2p_transfer",
            &submitted.signed_tx,
            params.amount,
            params.fee,
            &vtxo_ids,
            vec![output_vtxo],
            &params.recipient,
            &params.asset_id,
            params.amount,
        )
        .await
    }

    async fn step1_validate_transfer(&self, session: &SigningSession, params: &P2pTransferParams) -> OrchestrationResult<()> {
        self.check_cancel(session)?;
        self.revalidate_intent(session)?;
        if params.fee != P2P_TRANSFER_FEE_SATS {
            return Err(OrchestrationError::fee_invalid(format!(
                "expected fee {P2P_TRANSFER_FEE_SATS}, got {}",
                params.fee
            )));
        }
        if params.recipient.trim().is_empty() {
            return Err(OrchestrationError::recipient_invalid("recipient must be non-empty"));
        }
        let balance = self.assets.balance(&session.user_pubkey, &params.asset_id).await?;
        if balance.spendable() < params.amount + params.fee {
            return Err(OrchestrationError::insufficient_balance(
                "spendable balance below amount + fee",
            ));
        }
        Ok(())
    }

    // ---- lightning:lift: no wallet signature, asynchronous completion ----

    /// Lift requires no wallet signature (the user simply pays an external
    /// invoice), so the ceremony drives the session through the legal
    /// transition chain without issuing a real challenge, then leaves the
    /// session parked in `signing` until the Lightning daemon reports
    /// settlement (handled by [`LightningManager::handle_lift_settlement`],
    /// which completes the final `signing -> completed` edge).
    async fn run_lift_ceremony(&self, session: &SigningSession, params: LightningLiftParams) -> OrchestrationResult<()> {
        self.check_cancel(session)?;
        self.revalidate_intent(session)?;
        self.assets.get(&params.asset_id).await?;

        self.sessions.transition(&session.session_id, SessionStatus::ChallengeSent).await?;
        self.sessions.transition(&session.session_id, SessionStatus::AwaitingSignature).await?;
        self.sessions.transition(&session.session_id, SessionStatus::Signing).await?;

        self.lightning
            .initiate_lift(&params.asset_id, params.amount_sats, &session.session_id)
            .await?;
        info!(target: LOG_CEREMONY, session_id = %session.session_id, "lift invoice issued, awaiting settlement");
        Ok(())
    }

    // ---- lightning:land: ceremony steps 1-5, then C10 pays the invoice ---

    async fn run_land_ceremony(&self, session: &SigningSession, params: LightningLandParams) -> OrchestrationResult<()> {
        let session_id = session.session_id.clone();
        self.check_cancel(session)?;
        self.revalidate_intent(session)?;

        let balance = self.assets.balance(&session.user_pubkey, &params.asset_id).await?;
        if balance.spendable() < params.amount_sats + params.fee_sats {
            return Err(OrchestrationError::insufficient_balance("spendable balance below amount + fee"));
        }
        self.sessions.set_last_completed_step(&session_id, step::VALIDATED).await?;

        let assigned = self
            .vtxos
            .assign(&session.user_pubkey, &params.asset_id, params.amount_sats + params.fee_sats)
            .await?;
        let inputs: Vec<ArkTxInput> = assigned
            .iter()
            .map(|v| ArkTxInput { vtxo_id: v.vtxo_id.clone(), script_pubkey: v.script_pubkey.clone() })
            .collect();

        let ark_tx = self
            .retry_daemon_call(&session_id, "prepare_ark_tx", || {
                self.ark.prepare_ark_tx(PrepareArkTxRequest { inputs: inputs.clone(), outputs: vec![] })
            })
            .await?;
        self.sessions.set_last_completed_step(&session_id, step::ARK_TX_PREPARED).await?;

        let checkpoint = self
            .retry_daemon_call(&session_id, "prepare_checkpoint_tx", || {
                self.ark.prepare_checkpoint_tx(PrepareCheckpointTxRequest { unsigned_ark_tx: ark_tx.unsigned_ark_tx.clone() })
            })
            .await?;
        self.sessions.set_last_completed_step(&session_id, step::CHECKPOINT_PREPARED).await?;

        let mut all_payloads = ark_tx.signing_payloads.clone();
        all_payloads.extend(checkpoint.signing_payloads.clone());
        self.collect_signatures(session, &all_payloads, &params.asset_id).await?;
        self.sessions.set_last_completed_step(&session_id, step::SIGNATURES_COLLECTED).await?;

        self.lightning
            .initiate_land(
                &session.user_pubkey,
                &params.asset_id,
                &params.payment_hash,
                &params.bolt11_invoice,
                params.amount_sats,
                &session_id,
            )
            .await?;

        let vtxo_ids: Vec<String> = assigned.iter().map(|v| v.vtxo_id.clone()).collect();
        self.lightning.execute_land(&session_id, &params.payment_hash, &vtxo_ids).await
    }

    // ---- protocol_op: solver-supplied payload, steps 1, 4, 6 only --------

    async fn run_protocol_op_ceremony(&self, session: &SigningSession, params: ProtocolOpParams) -> OrchestrationResult<()> {
        let session_id = session.session_id.clone();
        self.check_cancel(session)?;
        self.revalidate_intent(session)?;
        if params.input_vtxo_ids.is_empty() {
            return Err(OrchestrationError::Validation("protocol_op requires at least one input".to_string()));
        }
        self.sessions.set_last_completed_step(&session_id, step::VALIDATED).await?;

        let mut payload_ref = [0u8; 32];
        payload_ref.copy_from_slice(&sha2_digest(&params.payload_to_sign));
        let payload = SigningPayload { payload_to_sign: params.payload_to_sign.clone(), payload_ref };

        let _signatures = self.collect_signatures(session, std::slice::from_ref(&payload), &params.asset_id).await?;
        self.sessions.set_last_completed_step(&session_id, step::SIGNATURES_COLLECTED).await?;

        let output_vtxo = match (&params.output_vtxo_id, params.output_amount_sats, &params.output_owner) {
            (Some(id), Some(amount), Some(owner)) => Some(NewVtxo {
                vtxo_id: id.clone(),
                txid: params.txid.clone(),
                vout: 0,
                amount_sats: amount,
                script_pubkey: owner.clone(),
                asset_id: params.asset_id.clone(),
                user_pubkey: Some(owner.clone()),
                expires_at: session.expires_at,
            }),
            _ => None,
        };

        self.finalize(
            session,
            &params.txid,
            "protocol_op",
            &params.raw_tx,
            0,
            0,
            &params.input_vtxo_ids,
            output_vtxo.into_iter().collect(),
            params.output_owner.as_deref().unwrap_or(""),
            &params.asset_id,
            params.output_amount_sats.unwrap_or(0),
        )
        .await
    }

    // ---- step 4: signature collection ------------------------------------

    /// Issues one challenge per payload, sequentially, within the session
    /// deadline (spec §4.7 step 4). Each payload advances
    /// `step_index`/`step_total` so the wallet can show ceremony progress.
    async fn collect_signatures(
        &self,
        session: &SigningSession,
        payloads: &[SigningPayload],
        asset_id: &str,
    ) -> OrchestrationResult<Vec<Vec<u8>>> {
        let total = payloads.len() as i16;
        let mut signatures = Vec::with_capacity(payloads.len());

        for (idx, payload) in payloads.iter().enumerate() {
            self.check_cancel(&self.sessions.get(&session.session_id).await?)?;

            let issued = self
                .challenges
                .generate(
                    &session.session_id,
                    &payload.payload_to_sign,
                    asset_id,
                    Some(idx as i16 + 1),
                    Some(total),
                )
                .await?;

            let deadline = self.step_deadline(session);
            let rx = self.waiter.register(issued.challenge.challenge_id.clone()).await;

            // Only the first payload's challenge drives the
            // `initiated -> challenge_sent -> awaiting_signature` edges;
            // later payloads in the same step are collected while the
            // session sits in `signing` (the state already advanced past
            // `awaiting_signature` once the first response verified).
            if idx == 0 {
                self.sessions.transition(&session.session_id, SessionStatus::ChallengeSent).await?;
                self.sessions.transition(&session.session_id, SessionStatus::AwaitingSignature).await?;
            }
            self.publisher
                .publish_challenge(
                    &session.user_pubkey,
                    &SigningChallengePayload {
                        session_id: session.session_id.clone(),
                        challenge_type: ChallengeKind::SignTx,
                        payload_to_sign: hex::encode(&payload.payload_to_sign),
                        payload_ref: hex::encode(issued.payload_ref),
                        algo: "schnorr".to_string(),
                        domain: "arkrelay".to_string(),
                        context: asset_id.to_string(),
                        step_index: Some(idx as u16 + 1),
                        step_total: Some(total as u16),
                        expires_at: issued.challenge.expires_at.timestamp(),
                    },
                )
                .await?;

            let timeout = deadline.saturating_duration_since(std::time::Instant::now());
            let response = match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(Ok(resp))) => resp,
                Ok(Ok(Err(err))) => {
                    self.waiter.cancel(&issued.challenge.challenge_id).await;
                    return Err(err);
                }
                Ok(Err(_)) => {
                    self.waiter.cancel(&issued.challenge.challenge_id).await;
                    return Err(OrchestrationError::signature_missing("response channel dropped"));
                }
                Err(_) => {
                    self.waiter.cancel(&issued.challenge.challenge_id).await;
                    return Err(OrchestrationError::Timeout("signing response".to_string()));
                }
            };

            let signature = hex::decode(&response.signature)
                .map_err(|e| OrchestrationError::signature_invalid(format!("bad signature hex: {e}")))?;
            signatures.push(signature);
        }

        Ok(signatures)
    }

    async fn retry_daemon_call<T, F, Fut>(&self, session_id: &str, op: &str, mut call: F) -> OrchestrationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, arkrelay_daemons::DaemonError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    attempt += 1;
                    let mapped: OrchestrationError = err.into();
                    let transient = matches!(mapped, OrchestrationError::BackendUnavailable(_));
                    if !transient || attempt >= STEP_RETRY_LIMIT {
                        return Err(mapped);
                    }
                    warn!(target: LOG_CEREMONY, session_id, op, attempt, "transient daemon error, retrying");
                    tokio::time::sleep(STEP_RETRY_BACKOFF * attempt).await;
                }
            }
        }
    }

    // ---- step 6: finalization --------------------------------------------

    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        session: &SigningSession,
        txid: &str,
        tx_type: &str,
        raw_tx: &[u8],
        amount_sats: i64,
        fee_sats: i64,
        input_vtxo_ids: &[String],
        output_vtxos: Vec<NewVtxo>,
        recipient: &str,
        asset_id: &str,
        recipient_amount: i64,
    ) -> OrchestrationResult<()> {
        let mut tx = self.store.begin().await?;
        let result = self
            .finalize_in_tx(&mut tx, session, txid, tx_type, raw_tx, amount_sats, fee_sats, input_vtxo_ids, output_vtxos, recipient, asset_id, recipient_amount)
            .await;

        if let Err(err) = result {
            tx.rollback().await?;
            return Err(err);
        }
        tx.commit().await?;

        self.sessions.set_last_completed_step(&session.session_id, step::FINALIZED).await?;
        self.sessions.transition(&session.session_id, SessionStatus::Completed).await?;

        self.publish_confirmation_with_retry(session, txid).await;
        info!(target: LOG_CEREMONY, session_id = %session.session_id, txid, "ceremony finalized");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize_in_tx(
        &self,
        tx: &mut StoreTx<'_>,
        session: &SigningSession,
        txid: &str,
        tx_type: &str,
        raw_tx: &[u8],
        amount_sats: i64,
        fee_sats: i64,
        input_vtxo_ids: &[String],
        output_vtxos: Vec<NewVtxo>,
        recipient: &str,
        asset_id: &str,
        recipient_amount: i64,
    ) -> OrchestrationResult<()> {
        tx.insert_transaction(NewTransaction {
            txid: txid.to_string(),
            session_id: session.session_id.clone(),
            tx_type: tx_type.to_string(),
            raw_tx: raw_tx.to_vec(),
            status: TransactionStatus::Broadcast,
            amount_sats,
            fee_sats,
        })
        .await?;

        tx.mark_vtxos_spent(input_vtxo_ids, txid).await?;

        if !output_vtxos.is_empty() {
            tx.insert_vtxo_batch(output_vtxos).await?;
            if !recipient.is_empty() && recipient_amount > 0 {
                tx.adjust_balance(recipient, asset_id, recipient_amount, recipient_amount).await?;
            }
        }
        Ok(())
    }

    /// Retries the confirmation publish with backoff until `expires_at +
    /// GRACE` (DESIGN.md Open Question resolution); the database state of
    /// truth is already committed by the time this runs (spec §4.7 step 6
    /// "retried; the database state of truth is already updated").
    async fn publish_confirmation_with_retry(&self, session: &SigningSession, txid: &str) {
        const GRACE: chrono::Duration = chrono::Duration::minutes(10);
        let deadline = session.expires_at + GRACE;
        let payload = ConfirmationPayload {
            status: "success".to_string(),
            ref_action_id: session.action_id.clone(),
            results: json!({ "txid": txid }),
        };

        let mut backoff = Duration::from_millis(500);
        loop {
            match self.publisher.publish_confirmation(&payload, &session.action_id).await {
                Ok(_) => return,
                Err(err) => {
                    warn!(target: LOG_CEREMONY, session_id = %session.session_id, error = %err, "confirmation publish failed, retrying");
                    if Utc::now() > deadline {
                        warn!(target: LOG_CEREMONY, session_id = %session.session_id, "confirmation publish exhausted retry window, relying on reconciliation");
                        return;
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(30));
                }
            }
        }
    }

    async fn fail_session(&self, session_id: &str, err: &OrchestrationError) {
        let code = match err {
            OrchestrationError::Cancelled => FailureCode::Cancelled,
            other => other.failure_code(),
        };

        let session = match self.sessions.get(session_id).await {
            Ok(s) => s,
            Err(_) => return,
        };
        if session.status.is_terminal() {
            return;
        }

        let target = if matches!(err, OrchestrationError::Precondition { code: FailureCode::Expired, .. }) {
            SessionStatus::Expired
        } else {
            SessionStatus::Failed
        };
        if let Err(transition_err) = self.sessions.transition(session_id, target).await {
            warn!(target: LOG_CEREMONY, session_id, error = %transition_err, "failed to mark session failed");
            return;
        }

        let payload = FailurePayload {
            status: "failure".to_string(),
            code: code.code(),
            message: err.public_message(),
            ref_action_id: session.action_id.clone(),
        };
        if let Err(publish_err) = self.publisher.publish_failure(&session.user_pubkey, &payload).await {
            warn!(target: LOG_CEREMONY, session_id, error = %publish_err, "failed to publish failure notice");
        }
    }
}

fn sha2_digest(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use sqlx::PgPool;

    use arkrelay_daemons::TapdDaemonRpc;
    use arkrelay_store::{AssetType, NewVtxo, SessionType, Store};
    use arkrelay_testing::fakes::{FakeArkDaemon, FakeLightningDaemon, FakeTapdDaemon};
    use arkrelay_testing::relay::FakeRelay;

    use crate::asset::AssetManager;
    use crate::challenge::ChallengeManager;
    use crate::lightning::LightningManager;
    use crate::session::SessionManager;
    use crate::vtxo::VtxoManager;
    use crate::waiter::ResponseWaiter;

    struct Harness {
        store: Arc<Store>,
        sessions: Arc<SessionManager>,
        vtxos: Arc<VtxoManager>,
        orchestrator: Arc<SigningOrchestrator>,
        relay: Arc<FakeRelay>,
    }

    fn build(pool: PgPool) -> Harness {
        let store = Arc::new(Store::from_pool(pool));
        let ark: Arc<dyn ArkDaemonRpc> = Arc::new(FakeArkDaemon::new());
        let tapd: Arc<dyn TapdDaemonRpc> = Arc::new(FakeTapdDaemon::new());
        let lightning_daemon: Arc<dyn arkrelay_daemons::LightningDaemonRpc> =
            Arc::new(FakeLightningDaemon::new());
        let relay = Arc::new(FakeRelay::new());
        let publisher: Arc<dyn EventPublisher> = relay.clone();

        let sessions = Arc::new(SessionManager::new(store.clone(), publisher.clone()));
        let challenges = Arc::new(ChallengeManager::new(store.clone(), sessions.clone()));
        let vtxos = Arc::new(VtxoManager::new(store.clone(), ark.clone(), tapd.clone(), publisher.clone()));
        let assets = Arc::new(AssetManager::new(store.clone(), tapd));
        let lightning = Arc::new(LightningManager::new(
            store.clone(),
            lightning_daemon,
            vtxos.clone(),
            assets.clone(),
            sessions.clone(),
            publisher.clone(),
        ));
        let waiter = Arc::new(ResponseWaiter::new());
        let orchestrator = Arc::new(SigningOrchestrator::new(
            store.clone(),
            ark,
            sessions.clone(),
            challenges,
            vtxos.clone(),
            assets,
            lightning,
            publisher,
            waiter,
        ));

        Harness { store, sessions, vtxos, orchestrator, relay }
    }

    async fn seed_asset(harness: &Harness, asset_id: &str) {
        let mut tx = harness.store.begin().await.unwrap();
        tx.create_asset(asset_id, "US Dollar", "USD", AssetType::Permissionless, 2).await.unwrap();
        tx.commit().await.unwrap();
    }

    fn intent_envelope(action_id: &str, intent_type: &str, params: serde_json::Value, expires_at: i64) -> serde_json::Value {
        json!({ "action_id": action_id, "type": intent_type, "params": params, "expires_at": expires_at })
    }

    async fn accept_transfer(
        harness: &Harness,
        user_pubkey: &str,
        action_id: &str,
        params: P2pTransferParams,
        intent_expires_at: i64,
    ) -> SigningSession {
        let envelope = intent_envelope(action_id, "p2p_transfer", serde_json::to_value(&params).unwrap(), intent_expires_at);
        harness
            .sessions
            .accept_intent(
                user_pubkey,
                action_id,
                SessionType::P2pTransfer,
                serde_json::to_value(&params).unwrap(),
                envelope,
                "p2p_transfer",
            )
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "../arkrelay-store/migrations")]
    async fn lift_ceremony_issues_invoice_without_a_wallet_signature(pool: PgPool) {
        let harness = build(pool);
        seed_asset(&harness, "usd").await;

        let params = LightningLiftParams { asset_id: "usd".to_string(), amount_sats: 5_000 };
        let envelope = intent_envelope("act-lift-1", "lightning:lift", serde_json::to_value(&params).unwrap(), i64::MAX);
        let session = harness
            .sessions
            .accept_intent(
                "wallet-a",
                "act-lift-1",
                SessionType::LightningLift,
                serde_json::to_value(&params).unwrap(),
                envelope,
                "lightning:lift",
            )
            .await
            .unwrap();

        harness.orchestrator.run(&session.session_id).await.unwrap();

        let updated = harness.sessions.get(&session.session_id).await.unwrap();
        assert_eq!(updated.status, SessionStatus::Signing);
        assert!(harness.relay.published().await.is_empty(), "lift never issues a wallet challenge");
    }

    #[sqlx::test(migrations = "../arkrelay-store/migrations")]
    async fn concurrent_transfers_cannot_both_claim_the_same_vtxo(pool: PgPool) {
        let harness = build(pool);
        seed_asset(&harness, "usd").await;

        // Only one 10_000-sat vtxo exists; two senders each try to spend it
        // at once.
        let mut tx = harness.store.begin().await.unwrap();
        tx.insert_vtxo_batch(vec![NewVtxo {
            vtxo_id: "vtxo-1".to_string(),
            txid: "txid-1".to_string(),
            vout: 0,
            amount_sats: 10_000,
            script_pubkey: String::new(),
            asset_id: "usd".to_string(),
            user_pubkey: None,
            expires_at: Utc::now() + chrono::Duration::days(1),
        }])
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let vtxos_a = harness.vtxos.clone();
        let vtxos_b = harness.vtxos.clone();
        let (a, b) = tokio::join!(
            async move { vtxos_a.assign("wallet-a", "usd", 10_000).await },
            async move { vtxos_b.assign("wallet-b", "usd", 10_000).await },
        );

        let successes = [a.is_ok(), b.is_ok()].into_iter().filter(|ok| *ok).count();
        assert_eq!(successes, 1, "exactly one concurrent assignment should win the single vtxo");
        let failure = if a.is_err() { a } else { b };
        assert!(matches!(
            failure.unwrap_err(),
            OrchestrationError::Precondition { code: FailureCode::InsufficientBalance, .. }
        ));
    }

    #[sqlx::test(migrations = "../arkrelay-store/migrations")]
    async fn revalidate_intent_rejects_a_stale_envelope(pool: PgPool) {
        let harness = build(pool);
        seed_asset(&harness, "usd").await;

        let params = P2pTransferParams {
            recipient: "wallet-b".to_string(),
            asset_id: "usd".to_string(),
            amount: 100,
            fee: P2P_TRANSFER_FEE_SATS,
        };
        // The session's own ceremony deadline (30 minutes out) is still
        // open, but the signed intent's `expires_at` already elapsed.
        let session = accept_transfer(&harness, "wallet-a", "act-stale-1", params, 0).await;

        let err = harness.orchestrator.revalidate_intent(&session).unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Precondition { code: FailureCode::Expired, .. }
        ));
    }

    #[sqlx::test(migrations = "../arkrelay-store/migrations")]
    async fn revalidate_intent_rejects_an_envelope_rebound_to_a_different_action(pool: PgPool) {
        let harness = build(pool);
        seed_asset(&harness, "usd").await;

        let params = P2pTransferParams {
            recipient: "wallet-b".to_string(),
            asset_id: "usd".to_string(),
            amount: 100,
            fee: P2P_TRANSFER_FEE_SATS,
        };
        let mut session = accept_transfer(&harness, "wallet-a", "act-1", params.clone(), i64::MAX).await;
        session.intent_envelope = intent_envelope("act-mismatched", "p2p_transfer", serde_json::to_value(&params).unwrap(), i64::MAX);

        let err = harness.orchestrator.revalidate_intent(&session).unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::Precondition { code: FailureCode::InvalidAuthorSignature, .. }
        ));
    }
}
