use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapAsset {
    pub asset_id: String,
    pub name: String,
    pub total_supply: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAssetsResponse {
    pub assets: Vec<TapAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAssetRequest {
    pub asset_id: String,
    pub amount: u64,
    pub recipient_script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferAssetResponse {
    pub transfer_txid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchProofRequest {
    pub asset_id: String,
    pub outpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchProofResponse {
    pub proof: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyProofRequest {
    pub proof: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyProofResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssetInvoiceRequest {
    pub asset_id: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssetInvoiceResponse {
    pub bolt11_invoice: String,
    pub payment_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayAssetInvoiceRequest {
    pub bolt11_invoice: String,
    pub asset_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayAssetInvoiceResponse {
    pub preimage: [u8; 32],
}

/// The Taproot-asset daemon: fungible asset issuance and proofs (glossary
/// "Taproot-asset daemon"). Same one-trait-per-daemon shape as
/// [`crate::ark::ArkDaemonRpc`], grounded on `ILnRpcClient`.
#[async_trait]
pub trait TapdDaemonRpc: Send + Sync {
    async fn list_assets(&self) -> Result<ListAssetsResponse, DaemonError>;

    async fn transfer_asset(
        &self,
        req: TransferAssetRequest,
    ) -> Result<TransferAssetResponse, DaemonError>;

    async fn fetch_proof(&self, req: FetchProofRequest) -> Result<FetchProofResponse, DaemonError>;

    async fn verify_proof(
        &self,
        req: VerifyProofRequest,
    ) -> Result<VerifyProofResponse, DaemonError>;

    async fn create_asset_invoice(
        &self,
        req: CreateAssetInvoiceRequest,
    ) -> Result<CreateAssetInvoiceResponse, DaemonError>;

    async fn pay_asset_invoice(
        &self,
        req: PayAssetInvoiceRequest,
    ) -> Result<PayAssetInvoiceResponse, DaemonError>;

    async fn health(&self) -> Result<(), DaemonError>;
}
