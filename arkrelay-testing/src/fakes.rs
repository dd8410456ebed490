//! In-memory stand-ins for the three backend daemons. Grounded on
//! `fedimint-testing/src/gateway.rs`'s `FakeLightningTest`/
//! `FakeLightningBuilder` pattern: a deterministic, in-process
//! implementation of the same trait the network client implements, so
//! `arkrelay-core` components are exercised without a live daemon.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use arkrelay_daemons::ark::{
    ArkTxInput, ArkTxOutput, CreateL1CommitmentRequest, CreateL1CommitmentResponse,
    CreateVtxoBatchRequest, CreateVtxoBatchResponse, NetworkInfo, PrepareArkTxRequest,
    PrepareArkTxResponse, PrepareCheckpointTxRequest, PrepareCheckpointTxResponse,
    QueryVtxoRequest, QueryVtxoResponse, SigningPayload, SubmitSignaturesRequest,
    SubmitSignaturesResponse,
};
use arkrelay_daemons::error::DaemonError;
use arkrelay_daemons::lightning::{
    AddInvoiceRequest, AddInvoiceResponse, Balances, InvoiceState, ListChannelsResponse,
    LookupInvoiceRequest, LookupInvoiceResponse, SendPaymentRequest, SendPaymentResponse,
};
use arkrelay_daemons::tapd::{
    CreateAssetInvoiceRequest, CreateAssetInvoiceResponse, FetchProofRequest, FetchProofResponse,
    ListAssetsResponse, PayAssetInvoiceRequest, PayAssetInvoiceResponse, TapAsset,
    TransferAssetRequest, TransferAssetResponse, VerifyProofRequest, VerifyProofResponse,
};
use arkrelay_daemons::{ArkDaemonRpc, LightningDaemonRpc, TapdDaemonRpc};

fn next_id(counter: &AtomicU64, prefix: &str) -> String {
    format!("{prefix}-{}", counter.fetch_add(1, Ordering::Relaxed))
}

/// Fake Ark-protocol daemon. Every call is deterministic and succeeds
/// unless a test opts a vtxo into the `rejected` set.
#[derive(Default)]
pub struct FakeArkDaemon {
    counter: AtomicU64,
    known_vtxos: Mutex<HashMap<String, QueryVtxoResponse>>,
}

impl FakeArkDaemon {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArkDaemonRpc for FakeArkDaemon {
    async fn create_vtxo_batch(
        &self,
        req: CreateVtxoBatchRequest,
    ) -> Result<CreateVtxoBatchResponse, DaemonError> {
        let batch_txid = next_id(&self.counter, "batch");
        let vtxo_ids: Vec<String> = (0..req.count).map(|_| next_id(&self.counter, "vtxo")).collect();

        let mut known = self.known_vtxos.lock().await;
        for vtxo_id in &vtxo_ids {
            known.insert(
                vtxo_id.clone(),
                QueryVtxoResponse {
                    vtxo_id: vtxo_id.clone(),
                    confirmed: true,
                    onchain_status: "confirmed".to_string(),
                },
            );
        }

        Ok(CreateVtxoBatchResponse { batch_txid, vtxo_ids })
    }

    async fn query_vtxo(&self, req: QueryVtxoRequest) -> Result<QueryVtxoResponse, DaemonError> {
        self.known_vtxos
            .lock()
            .await
            .get(&req.vtxo_id)
            .cloned()
            .ok_or_else(|| DaemonError::Rejected {
                daemon: "ark",
                op: "query_vtxo",
                reason: format!("unknown vtxo {}", req.vtxo_id),
            })
    }

    async fn prepare_ark_tx(
        &self,
        req: PrepareArkTxRequest,
    ) -> Result<PrepareArkTxResponse, DaemonError> {
        let unsigned_ark_tx = encode_tx_skeleton(&req.inputs, &req.outputs);
        let payload_to_sign = unsigned_ark_tx.clone();
        let payload_ref = digest(&payload_to_sign);
        Ok(PrepareArkTxResponse {
            unsigned_ark_tx,
            signing_payloads: vec![SigningPayload { payload_to_sign, payload_ref }],
        })
    }

    async fn prepare_checkpoint_tx(
        &self,
        req: PrepareCheckpointTxRequest,
    ) -> Result<PrepareCheckpointTxResponse, DaemonError> {
        let mut checkpoint_tx = req.unsigned_ark_tx.clone();
        checkpoint_tx.push(0xc0);
        let payload_ref = digest(&checkpoint_tx);
        Ok(PrepareCheckpointTxResponse {
            checkpoint_txs: vec![checkpoint_tx.clone()],
            signing_payloads: vec![SigningPayload { payload_to_sign: checkpoint_tx, payload_ref }],
        })
    }

    async fn submit_signatures(
        &self,
        req: SubmitSignaturesRequest,
    ) -> Result<SubmitSignaturesResponse, DaemonError> {
        if req.signatures.is_empty() {
            return Err(DaemonError::Rejected {
                daemon: "ark",
                op: "submit_signatures",
                reason: "no signatures supplied".to_string(),
            });
        }
        let mut signed_tx = req.unsigned_ark_tx.clone();
        for sig in &req.signatures {
            signed_tx.extend_from_slice(sig);
        }
        let txid = next_id(&self.counter, "tx");
        Ok(SubmitSignaturesResponse { signed_tx, txid })
    }

    async fn get_network_info(&self) -> Result<NetworkInfo, DaemonError> {
        Ok(NetworkInfo { block_height: 800_000, fee_rate_sat_vb: 5.0 })
    }

    async fn create_l1_commitment(
        &self,
        req: CreateL1CommitmentRequest,
    ) -> Result<CreateL1CommitmentResponse, DaemonError> {
        let l1_txid = format!("l1-{}", req.batch_id);
        Ok(CreateL1CommitmentResponse { l1_txid, raw_tx: req.merkle_root.to_vec() })
    }

    async fn health(&self) -> Result<(), DaemonError> {
        Ok(())
    }
}

#[cfg(test)]
mod ark_tests {
    use super::*;

    #[tokio::test]
    async fn created_vtxos_are_queryable() {
        let daemon = FakeArkDaemon::new();
        let batch = daemon
            .create_vtxo_batch(CreateVtxoBatchRequest {
                asset_id: "usd".to_string(),
                count: 3,
                denomination_sats: 1_000,
            })
            .await
            .unwrap();
        assert_eq!(batch.vtxo_ids.len(), 3);

        for vtxo_id in &batch.vtxo_ids {
            let queried = daemon
                .query_vtxo(QueryVtxoRequest { vtxo_id: vtxo_id.clone() })
                .await
                .unwrap();
            assert!(queried.confirmed);
        }
    }

    #[tokio::test]
    async fn querying_unknown_vtxo_is_rejected() {
        let daemon = FakeArkDaemon::new();
        let err = daemon
            .query_vtxo(QueryVtxoRequest { vtxo_id: "nope".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Rejected { .. }));
    }

    #[tokio::test]
    async fn submit_signatures_rejects_empty_signature_set() {
        let daemon = FakeArkDaemon::new();
        let err = daemon
            .submit_signatures(SubmitSignaturesRequest {
                unsigned_ark_tx: vec![1, 2, 3],
                checkpoint_txs: vec![],
                signatures: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Rejected { .. }));
    }
}

fn encode_tx_skeleton(inputs: &[ArkTxInput], outputs: &[ArkTxOutput]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for input in inputs {
        bytes.extend_from_slice(input.vtxo_id.as_bytes());
    }
    for output in outputs {
        bytes.extend_from_slice(output.script_pubkey.as_bytes());
        bytes.extend_from_slice(&output.amount_sats.to_le_bytes());
    }
    bytes
}

fn digest(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

struct FakeInvoice {
    amount_sats: u64,
    state: InvoiceState,
}

/// Fake Lightning node. Invoices settle only when a test calls
/// [`FakeLightningDaemon::settle`] — nothing settles on its own, so
/// reconciliation-poll tests control timing explicitly.
#[derive(Default)]
pub struct FakeLightningDaemon {
    counter: AtomicU64,
    invoices: Mutex<HashMap<String, FakeInvoice>>,
}

impl FakeLightningDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: marks `payment_hash` settled, as if the node's own
    /// settlement notification had arrived.
    pub async fn settle(&self, payment_hash: &str) {
        if let Some(invoice) = self.invoices.lock().await.get_mut(payment_hash) {
            invoice.state = InvoiceState::Settled;
        }
    }
}

#[async_trait]
impl LightningDaemonRpc for FakeLightningDaemon {
    async fn get_balances(&self) -> Result<Balances, DaemonError> {
        Ok(Balances { onchain_sats: 0, channel_local_sats: 10_000_000, channel_remote_sats: 10_000_000 })
    }

    async fn list_channels(&self) -> Result<ListChannelsResponse, DaemonError> {
        Ok(ListChannelsResponse { channels: vec![] })
    }

    async fn add_invoice(&self, req: AddInvoiceRequest) -> Result<AddInvoiceResponse, DaemonError> {
        let payment_hash = next_id(&self.counter, "hash");
        let bolt11_invoice = format!("lnfake1{payment_hash}{}", req.amount_sats);
        self.invoices.lock().await.insert(
            payment_hash.clone(),
            FakeInvoice { amount_sats: req.amount_sats, state: InvoiceState::Pending },
        );
        Ok(AddInvoiceResponse { payment_hash, bolt11_invoice })
    }

    async fn lookup_invoice(
        &self,
        req: LookupInvoiceRequest,
    ) -> Result<LookupInvoiceResponse, DaemonError> {
        let invoices = self.invoices.lock().await;
        let invoice = invoices.get(&req.payment_hash).ok_or_else(|| DaemonError::Rejected {
            daemon: "lightning",
            op: "lookup_invoice",
            reason: format!("unknown payment_hash {}", req.payment_hash),
        })?;
        Ok(LookupInvoiceResponse {
            state: invoice.state,
            amount_paid_sats: if invoice.state == InvoiceState::Settled { invoice.amount_sats } else { 0 },
        })
    }

    async fn send_payment(&self, req: SendPaymentRequest) -> Result<SendPaymentResponse, DaemonError> {
        if req.bolt11_invoice.is_empty() {
            return Err(DaemonError::Rejected {
                daemon: "lightning",
                op: "send_payment",
                reason: "empty invoice".to_string(),
            });
        }
        let preimage = digest(req.bolt11_invoice.as_bytes());
        Ok(SendPaymentResponse { preimage, fee_paid_sats: 1 })
    }

    async fn health(&self) -> Result<(), DaemonError> {
        Ok(())
    }
}

#[cfg(test)]
mod lightning_tests {
    use super::*;

    #[tokio::test]
    async fn invoice_settles_only_after_settle_is_called() {
        let daemon = FakeLightningDaemon::new();
        let invoice = daemon.add_invoice(AddInvoiceRequest {
            amount_sats: 1_000,
            memo: "lift".to_string(),
            expiry_secs: 900,
        }).await.unwrap();

        let before = daemon
            .lookup_invoice(LookupInvoiceRequest { payment_hash: invoice.payment_hash.clone() })
            .await
            .unwrap();
        assert_eq!(before.state, InvoiceState::Pending);
        assert_eq!(before.amount_paid_sats, 0);

        daemon.settle(&invoice.payment_hash).await;

        let after = daemon
            .lookup_invoice(LookupInvoiceRequest { payment_hash: invoice.payment_hash })
            .await
            .unwrap();
        assert_eq!(after.state, InvoiceState::Settled);
        assert_eq!(after.amount_paid_sats, 1_000);
    }

    #[tokio::test]
    async fn lookup_of_unknown_payment_hash_is_rejected() {
        let daemon = FakeLightningDaemon::new();
        let err = daemon
            .lookup_invoice(LookupInvoiceRequest { payment_hash: "missing".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Rejected { .. }));
    }
}

/// Fake Taproot-asset daemon. Holds no real proofs; `verify_proof` always
/// succeeds for a non-empty proof, matching the optimistic-path behavior
/// tests need without re-implementing BIP-174-style proof verification.
/// `list_assets` only returns what a test has seeded with
/// [`FakeTapdDaemon::seed_asset`] — an empty universe by default, so
/// `AssetManager::create` against an un-seeded fake fails the same way it
/// would against a real daemon that doesn't know the asset.
#[derive(Default)]
pub struct FakeTapdDaemon {
    counter: AtomicU64,
    known: Mutex<Vec<TapAsset>>,
}

impl FakeTapdDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: makes `asset_id` visible to `list_assets`.
    pub async fn seed_asset(&self, asset_id: &str, name: &str, total_supply: u64) {
        self.known.lock().await.push(TapAsset {
            asset_id: asset_id.to_string(),
            name: name.to_string(),
            total_supply,
        });
    }
}

#[async_trait]
impl TapdDaemonRpc for FakeTapdDaemon {
    async fn list_assets(&self) -> Result<ListAssetsResponse, DaemonError> {
        Ok(ListAssetsResponse { assets: self.known.lock().await.clone() })
    }

    async fn transfer_asset(
        &self,
        _req: TransferAssetRequest,
    ) -> Result<TransferAssetResponse, DaemonError> {
        Ok(TransferAssetResponse { transfer_txid: next_id(&self.counter, "transfer") })
    }

    async fn fetch_proof(&self, req: FetchProofRequest) -> Result<FetchProofResponse, DaemonError> {
        Ok(FetchProofResponse { proof: req.outpoint.into_bytes() })
    }

    async fn verify_proof(&self, req: VerifyProofRequest) -> Result<VerifyProofResponse, DaemonError> {
        Ok(VerifyProofResponse { valid: !req.proof.is_empty() })
    }

    async fn create_asset_invoice(
        &self,
        req: CreateAssetInvoiceRequest,
    ) -> Result<CreateAssetInvoiceResponse, DaemonError> {
        let payment_hash = next_id(&self.counter, "asset-hash");
        Ok(CreateAssetInvoiceResponse {
            bolt11_invoice: format!("lnasset1{payment_hash}{}", req.amount),
            payment_hash,
        })
    }

    async fn pay_asset_invoice(
        &self,
        req: PayAssetInvoiceRequest,
    ) -> Result<PayAssetInvoiceResponse, DaemonError> {
        Ok(PayAssetInvoiceResponse { preimage: digest(req.bolt11_invoice.as_bytes()) })
    }

    async fn health(&self) -> Result<(), DaemonError> {
        Ok(())
    }
}

#[cfg(test)]
mod tapd_tests {
    use super::*;

    #[tokio::test]
    async fn empty_proof_fails_verification() {
        let daemon = FakeTapdDaemon::new();
        let result = daemon.verify_proof(VerifyProofRequest { proof: vec![] }).await.unwrap();
        assert!(!result.valid);
    }

    #[tokio::test]
    async fn fetch_proof_then_verify_succeeds() {
        let daemon = FakeTapdDaemon::new();
        let proof = daemon
            .fetch_proof(FetchProofRequest { asset_id: "usd".to_string(), outpoint: "txid:0".to_string() })
            .await
            .unwrap();
        let verified = daemon.verify_proof(VerifyProofRequest { proof: proof.proof }).await.unwrap();
        assert!(verified.valid);
    }

    #[tokio::test]
    async fn list_assets_is_empty_until_seeded() {
        let daemon = FakeTapdDaemon::new();
        assert!(daemon.list_assets().await.unwrap().assets.is_empty());

        daemon.seed_asset("usd", "US Dollar", 1_000_000).await;
        let listed = daemon.list_assets().await.unwrap().assets;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].asset_id, "usd");
    }
}
