use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVtxoBatchRequest {
    pub asset_id: String,
    pub count: u32,
    pub denomination_sats: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVtxoBatchResponse {
    pub batch_txid: String,
    pub vtxo_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryVtxoRequest {
    pub vtxo_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryVtxoResponse {
    pub vtxo_id: String,
    pub confirmed: bool,
    pub onchain_status: String,
}

/// Inputs derived from the user's VTXOs and the requested outputs of an
/// intent (spec §4.7 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArkTxInput {
    pub vtxo_id: String,
    pub script_pubkey: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArkTxOutput {
    pub script_pubkey: String,
    pub amount_sats: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareArkTxRequest {
    pub inputs: Vec<ArkTxInput>,
    pub outputs: Vec<ArkTxOutput>,
}

/// One payload a wallet must sign, bound to `payload_ref` by the challenge
/// manager (C6). The bytes themselves are opaque — see DESIGN.md Open
/// Question 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningPayload {
    pub payload_to_sign: Vec<u8>,
    pub payload_ref: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareArkTxResponse {
    pub unsigned_ark_tx: Vec<u8>,
    pub signing_payloads: Vec<SigningPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareCheckpointTxRequest {
    pub unsigned_ark_tx: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareCheckpointTxResponse {
    pub checkpoint_txs: Vec<Vec<u8>>,
    pub signing_payloads: Vec<SigningPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSignaturesRequest {
    pub unsigned_ark_tx: Vec<u8>,
    pub checkpoint_txs: Vec<Vec<u8>>,
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSignaturesResponse {
    pub signed_tx: Vec<u8>,
    pub txid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub block_height: u64,
    pub fee_rate_sat_vb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateL1CommitmentRequest {
    pub merkle_root: [u8; 32],
    pub batch_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateL1CommitmentResponse {
    pub l1_txid: String,
    pub raw_tx: Vec<u8>,
}

/// The Ark-protocol daemon: VTXO lifecycle and L1 commitment (spec §4.2,
/// §4.9, glossary "Ark daemon"). Shaped after `ILnRpcClient`
/// (`gateway/ln-gateway/src/lightning/mod.rs`) — one method per operation,
/// a single typed error, `Send + Sync` for sharing across workers.
#[async_trait]
pub trait ArkDaemonRpc: Send + Sync {
    async fn create_vtxo_batch(
        &self,
        req: CreateVtxoBatchRequest,
    ) -> Result<CreateVtxoBatchResponse, DaemonError>;

    async fn query_vtxo(&self, req: QueryVtxoRequest) -> Result<QueryVtxoResponse, DaemonError>;

    async fn prepare_ark_tx(
        &self,
        req: PrepareArkTxRequest,
    ) -> Result<PrepareArkTxResponse, DaemonError>;

    async fn prepare_checkpoint_tx(
        &self,
        req: PrepareCheckpointTxRequest,
    ) -> Result<PrepareCheckpointTxResponse, DaemonError>;

    async fn submit_signatures(
        &self,
        req: SubmitSignaturesRequest,
    ) -> Result<SubmitSignaturesResponse, DaemonError>;

    async fn get_network_info(&self) -> Result<NetworkInfo, DaemonError>;

    async fn create_l1_commitment(
        &self,
        req: CreateL1CommitmentRequest,
    ) -> Result<CreateL1CommitmentResponse, DaemonError>;

    async fn health(&self) -> Result<(), DaemonError>;
}
