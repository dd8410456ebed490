//! C10 Lightning Manager — on-ramp (lift), off-ramp (land), and settlement
//! reconciliation (spec.md §4.10).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use arkrelay_daemons::lightning::{AddInvoiceRequest, LookupInvoiceRequest, SendPaymentRequest};
use arkrelay_daemons::LightningDaemonRpc;
use arkrelay_relay::ConfirmationPayload;
use arkrelay_store::{InvoiceStatus, InvoiceType, LightningInvoice, NewLightningInvoice, SessionStatus, Store};

use crate::asset::AssetManager;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::logging::LOG_LIGHTNING;
use crate::ports::EventPublisher;
use crate::session::SessionManager;
use crate::vtxo::VtxoManager;

/// Lift invoice expiry (spec leaves this at design level; fixed here).
pub const LIFT_INVOICE_EXPIRY_SECS: u32 = 15 * 60;
/// Reconciliation poll cadence for invoices the daemon hasn't pushed a
/// settlement signal for yet.
pub const RECONCILIATION_POLL_INTERVAL: Duration = Duration::from_secs(20);
/// Land fee: 0.1% of the withdrawn amount (spec §6 "Fees").
pub const LAND_FEE_BPS: i64 = 10; // 10 basis points = 0.1%

pub fn land_fee_sats(amount_sats: i64) -> i64 {
    (amount_sats * LAND_FEE_BPS) / 10_000
}

pub struct LightningManager {
    store: Arc<Store>,
    lightning: Arc<dyn LightningDaemonRpc>,
    vtxos: Arc<VtxoManager>,
    assets: Arc<AssetManager>,
    sessions: Arc<SessionManager>,
    publisher: Arc<dyn EventPublisher>,
}

impl LightningManager {
    pub fn new(
        store: Arc<Store>,
        lightning: Arc<dyn LightningDaemonRpc>,
        vtxos: Arc<VtxoManager>,
        assets: Arc<AssetManager>,
        sessions: Arc<SessionManager>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            lightning,
            vtxos,
            assets,
            sessions,
            publisher,
        }
    }

    /// Lift (on-ramp, spec §4.10): creates the invoice and binds it to the
    /// already-`initiated` session the orchestrator created for this
    /// intent.
    pub async fn initiate_lift(
        &self,
        asset_id: &str,
        amount_sats: i64,
        session_id: &str,
    ) -> OrchestrationResult<LightningInvoice> {
        let response = self
            .lightning
            .add_invoice(AddInvoiceRequest {
                amount_sats: amount_sats as u64,
                memo: format!("arkrelay lift {session_id}"),
                expiry_secs: LIFT_INVOICE_EXPIRY_SECS,
            })
            .await?;

        let mut tx = self.store.begin().await?;
        let invoice = tx
            .insert_invoice(NewLightningInvoice {
                payment_hash: response.payment_hash,
                bolt11_invoice: response.bolt11_invoice,
                session_id: Some(session_id.to_string()),
                amount_sats,
                asset_id: asset_id.to_string(),
                invoice_type: InvoiceType::Lift,
            })
            .await?;
        tx.commit().await?;

        info!(target: LOG_LIGHTNING, session_id, payment_hash = %invoice.payment_hash, "lift invoice created");
        Ok(invoice)
    }

    /// Off-ramp (spec §4.10 "Land"): records the invoice we are about to
    /// pay. `amount_sats`/`payment_hash` are supplied by the caller (the
    /// wallet decodes its own bolt11 string before submitting the intent);
    /// the gateway never parses bolt11 text itself (no bolt11 codec is in
    /// the dependency stack — the Lightning daemon is the sole authority
    /// on invoice validity).
    pub async fn initiate_land(
        &self,
        user_pubkey: &str,
        asset_id: &str,
        payment_hash: &str,
        bolt11_invoice: &str,
        amount_sats: i64,
        session_id: &str,
    ) -> OrchestrationResult<LightningInvoice> {
        let fee = land_fee_sats(amount_sats);
        let balance = self.assets.balance(user_pubkey, asset_id).await?;
        if balance.spendable() < amount_sats + fee {
            return Err(OrchestrationError::insufficient_balance(
                "insufficient spendable balance for land",
            ));
        }

        let mut tx = self.store.begin().await?;
        let invoice = tx
            .insert_invoice(NewLightningInvoice {
                payment_hash: payment_hash.to_string(),
                bolt11_invoice: bolt11_invoice.to_string(),
                session_id: Some(session_id.to_string()),
                amount_sats,
                asset_id: asset_id.to_string(),
                invoice_type: InvoiceType::Land,
            })
            .await?;
        tx.commit().await?;
        Ok(invoice)
    }

    /// Executes a land once the ceremony has assigned+locked
    /// `input_vtxo_ids` covering `amount + fee` (spec §4.10 "prepare the
    /// spending transaction through C8; on ceremony success, pay the
    /// invoice").
    pub async fn execute_land(
        &self,
        session_id: &str,
        payment_hash: &str,
        input_vtxo_ids: &[String],
    ) -> OrchestrationResult<()> {
        let invoice = self
            .store
            .get_invoice(payment_hash)
            .await?
            .ok_or_else(|| OrchestrationError::Validation(format!("unknown invoice {payment_hash}")))?;

        let max_fee = land_fee_sats(invoice.amount_sats).max(1);
        let payment = self
            .lightning
            .send_payment(SendPaymentRequest {
                bolt11_invoice: invoice.bolt11_invoice.clone(),
                max_fee_sats: max_fee as u64,
            })
            .await?;

        let spending_txid = format!("land-{payment_hash}");
        self.vtxos.mark_spent(input_vtxo_ids, &spending_txid).await?;

        let mut tx = self.store.begin().await?;
        tx.set_invoice_status(payment_hash, InvoiceStatus::Settled).await?;
        tx.commit().await?;

        self.sessions.transition(session_id, SessionStatus::Completed).await?;

        let session = self.sessions.get(session_id).await?;
        self.publisher
            .publish_confirmation(
                &ConfirmationPayload {
                    status: "success".to_string(),
                    ref_action_id: session.action_id.clone(),
                    results: json!({
                        "payment_hash": payment_hash,
                        "preimage": hex::encode(payment.preimage),
                        "fee_paid_sats": payment.fee_paid_sats,
                    }),
                },
                &session.action_id,
            )
            .await?;
        Ok(())
    }

    /// Invoked once the daemon (or the reconciliation poller) confirms a
    /// lift invoice settled. Idempotent: a duplicate settlement signal for
    /// an already-`settled` invoice is a no-op (spec §4.10
    /// "Reconciliation").
    pub async fn handle_lift_settlement(&self, payment_hash: &str) -> OrchestrationResult<()> {
        let invoice = self
            .store
            .get_invoice(payment_hash)
            .await?
            .ok_or_else(|| OrchestrationError::Validation(format!("unknown invoice {payment_hash}")))?;

        if invoice.status == InvoiceStatus::Settled {
            return Ok(());
        }

        let session_id = invoice
            .session_id
            .clone()
            .ok_or_else(|| OrchestrationError::Internal("lift invoice missing session_id".to_string()))?;
        let session = self.sessions.get(&session_id).await?;

        self.vtxos
            .credit_lift(&session.user_pubkey, &invoice.asset_id, invoice.amount_sats)
            .await?;

        let mut tx = self.store.begin().await?;
        tx.set_invoice_status(payment_hash, InvoiceStatus::Settled).await?;
        tx.commit().await?;

        self.sessions.transition(&session_id, SessionStatus::Completed).await?;

        self.publisher
            .publish_confirmation(
                &ConfirmationPayload {
                    status: "success".to_string(),
                    ref_action_id: session.action_id.clone(),
                    results: json!({ "payment_hash": payment_hash, "amount_sats": invoice.amount_sats }),
                },
                &session.action_id,
            )
            .await?;

        info!(target: LOG_LIGHTNING, session_id, payment_hash, "lift settled");
        Ok(())
    }

    /// Polls outstanding lift invoices forever; land invoices are resolved
    /// synchronously in [`Self::execute_land`], so only lift invoices ever
    /// need reconciliation against the daemon's view.
    pub async fn run_reconciliation(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(RECONCILIATION_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = self.reconcile_once().await {
                warn!(target: LOG_LIGHTNING, error = %err, "reconciliation pass failed");
            }
        }
    }

    async fn reconcile_once(&self) -> OrchestrationResult<()> {
        let pending = self.store.list_pending_invoices().await?;
        for invoice in pending.into_iter().filter(|i| i.invoice_type == InvoiceType::Lift) {
            let status = self
                .lightning
                .lookup_invoice(LookupInvoiceRequest { payment_hash: invoice.payment_hash.clone() })
                .await?;
            if status.state == arkrelay_daemons::lightning::InvoiceState::Settled {
                if let Err(err) = self.handle_lift_settlement(&invoice.payment_hash).await {
                    warn!(target: LOG_LIGHTNING, payment_hash = %invoice.payment_hash, error = %err, "failed to finalize reconciled lift");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn land_fee_is_ten_bps() {
        assert_eq!(land_fee_sats(1_000_000), 1_000);
        assert_eq!(land_fee_sats(100), 0);
        assert_eq!(land_fee_sats(0), 0);
    }

    #[test]
    fn land_fee_rounds_down() {
        assert_eq!(land_fee_sats(999), 0);
        assert_eq!(land_fee_sats(10_999), 10);
    }
}
