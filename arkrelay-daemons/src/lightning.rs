use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balances {
    pub onchain_sats: u64,
    pub channel_local_sats: u64,
    pub channel_remote_sats: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub remote_pubkey: String,
    pub capacity_sats: u64,
    pub local_balance_sats: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListChannelsResponse {
    pub channels: Vec<ChannelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddInvoiceRequest {
    pub amount_sats: u64,
    pub memo: String,
    pub expiry_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddInvoiceResponse {
    pub payment_hash: String,
    pub bolt11_invoice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupInvoiceRequest {
    pub payment_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceState {
    Pending,
    Settled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupInvoiceResponse {
    pub state: InvoiceState,
    pub amount_paid_sats: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPaymentRequest {
    pub bolt11_invoice: String,
    pub max_fee_sats: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPaymentResponse {
    pub preimage: [u8; 32],
    pub fee_paid_sats: u64,
}

/// The Lightning node: pays and receives Lightning-layer payments (glossary
/// "Lightning daemon"). Mirrors `ILnRpcClient`
/// (`gateway/ln-gateway/src/lightning/mod.rs`) field-for-field where the
/// operations line up (`pay` -> `send_payment`, `create_invoice` ->
/// `add_invoice`).
#[async_trait]
pub trait LightningDaemonRpc: Send + Sync {
    async fn get_balances(&self) -> Result<Balances, DaemonError>;

    async fn list_channels(&self) -> Result<ListChannelsResponse, DaemonError>;

    async fn add_invoice(&self, req: AddInvoiceRequest) -> Result<AddInvoiceResponse, DaemonError>;

    async fn lookup_invoice(
        &self,
        req: LookupInvoiceRequest,
    ) -> Result<LookupInvoiceResponse, DaemonError>;

    async fn send_payment(
        &self,
        req: SendPaymentRequest,
    ) -> Result<SendPaymentResponse, DaemonError>;

    async fn health(&self) -> Result<(), DaemonError>;
}
