//! Per-daemon wrappers that apply [`ResilientCall`] to every trait method,
//! so callers hold a plain `Arc<dyn ArkDaemonRpc>` etc. and never see the
//! retry/circuit-breaker plumbing. Mirrors how `NetworkLnRpcClient` wraps
//! the raw CLN client with its own retry-connect loop behind the same
//! `ILnRpcClient` trait (`gateway/ln-gateway/src/lightning/cln.rs`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapter::ResilientCall;
use crate::ark::*;
use crate::error::DaemonError;
use crate::lightning::*;
use crate::tapd::*;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

pub struct ResilientArkDaemon {
    inner: Arc<dyn ArkDaemonRpc>,
    resilient: ResilientCall,
}

impl ResilientArkDaemon {
    pub fn new(inner: Arc<dyn ArkDaemonRpc>) -> Self {
        Self {
            inner,
            resilient: ResilientCall::new("ark", DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN),
        }
    }
}

#[async_trait]
impl ArkDaemonRpc for ResilientArkDaemon {
    async fn create_vtxo_batch(
        &self,
        req: CreateVtxoBatchRequest,
    ) -> Result<CreateVtxoBatchResponse, DaemonError> {
        self.resilient
            .call("create_vtxo_batch", || self.inner.create_vtxo_batch(req.clone()))
            .await
    }

    async fn query_vtxo(&self, req: QueryVtxoRequest) -> Result<QueryVtxoResponse, DaemonError> {
        self.resilient
            .call("query_vtxo", || self.inner.query_vtxo(req.clone()))
            .await
    }

    async fn prepare_ark_tx(
        &self,
        req: PrepareArkTxRequest,
    ) -> Result<PrepareArkTxResponse, DaemonError> {
        self.resilient
            .call("prepare_ark_tx", || self.inner.prepare_ark_tx(req.clone()))
            .await
    }

    async fn prepare_checkpoint_tx(
        &self,
        req: PrepareCheckpointTxRequest,
    ) -> Result<PrepareCheckpointTxResponse, DaemonError> {
        self.resilient
            .call("prepare_checkpoint_tx", || {
                self.inner.prepare_checkpoint_tx(req.clone())
            })
            .await
    }

    async fn submit_signatures(
        &self,
        req: SubmitSignaturesRequest,
    ) -> Result<SubmitSignaturesResponse, DaemonError> {
        self.resilient
            .call("submit_signatures", || self.inner.submit_signatures(req.clone()))
            .await
    }

    async fn get_network_info(&self) -> Result<NetworkInfo, DaemonError> {
        self.resilient
            .call("get_network_info", || self.inner.get_network_info())
            .await
    }

    async fn create_l1_commitment(
        &self,
        req: CreateL1CommitmentRequest,
    ) -> Result<CreateL1CommitmentResponse, DaemonError> {
        self.resilient
            .call("create_l1_commitment", || self.inner.create_l1_commitment(req.clone()))
            .await
    }

    async fn health(&self) -> Result<(), DaemonError> {
        self.inner.health().await
    }
}

pub struct ResilientTapdDaemon {
    inner: Arc<dyn TapdDaemonRpc>,
    resilient: ResilientCall,
}

impl ResilientTapdDaemon {
    pub fn new(inner: Arc<dyn TapdDaemonRpc>) -> Self {
        Self {
            inner,
            resilient: ResilientCall::new("tapd", DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN),
        }
    }
}

#[async_trait]
impl TapdDaemonRpc for ResilientTapdDaemon {
    async fn list_assets(&self) -> Result<ListAssetsResponse, DaemonError> {
        self.resilient.call("list_assets", || self.inner.list_assets()).await
    }

    async fn transfer_asset(
        &self,
        req: TransferAssetRequest,
    ) -> Result<TransferAssetResponse, DaemonError> {
        self.resilient
            .call("transfer_asset", || self.inner.transfer_asset(req.clone()))
            .await
    }

    async fn fetch_proof(&self, req: FetchProofRequest) -> Result<FetchProofResponse, DaemonError> {
        self.resilient
            .call("fetch_proof", || self.inner.fetch_proof(req.clone()))
            .await
    }

    async fn verify_proof(&self, req: VerifyProofRequest) -> Result<VerifyProofResponse, DaemonError> {
        self.resilient
            .call("verify_proof", || self.inner.verify_proof(req.clone()))
            .await
    }

    async fn create_asset_invoice(
        &self,
        req: CreateAssetInvoiceRequest,
    ) -> Result<CreateAssetInvoiceResponse, DaemonError> {
        self.resilient
            .call("create_asset_invoice", || self.inner.create_asset_invoice(req.clone()))
            .await
    }

    async fn pay_asset_invoice(
        &self,
        req: PayAssetInvoiceRequest,
    ) -> Result<PayAssetInvoiceResponse, DaemonError> {
        self.resilient
            .call("pay_asset_invoice", || self.inner.pay_asset_invoice(req.clone()))
            .await
    }

    async fn health(&self) -> Result<(), DaemonError> {
        self.inner.health().await
    }
}

pub struct ResilientLightningDaemon {
    inner: Arc<dyn LightningDaemonRpc>,
    resilient: ResilientCall,
}

impl ResilientLightningDaemon {
    pub fn new(inner: Arc<dyn LightningDaemonRpc>) -> Self {
        Self {
            inner,
            resilient: ResilientCall::new("lightning", DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN),
        }
    }
}

#[async_trait]
impl LightningDaemonRpc for ResilientLightningDaemon {
    async fn get_balances(&self) -> Result<Balances, DaemonError> {
        self.resilient.call("get_balances", || self.inner.get_balances()).await
    }

    async fn list_channels(&self) -> Result<ListChannelsResponse, DaemonError> {
        self.resilient.call("list_channels", || self.inner.list_channels()).await
    }

    async fn add_invoice(&self, req: AddInvoiceRequest) -> Result<AddInvoiceResponse, DaemonError> {
        self.resilient
            .call("add_invoice", || self.inner.add_invoice(req.clone()))
            .await
    }

    async fn lookup_invoice(
        &self,
        req: LookupInvoiceRequest,
    ) -> Result<LookupInvoiceResponse, DaemonError> {
        self.resilient
            .call("lookup_invoice", || self.inner.lookup_invoice(req.clone()))
            .await
    }

    async fn send_payment(&self, req: SendPaymentRequest) -> Result<SendPaymentResponse, DaemonError> {
        self.resilient
            .call("send_payment", || self.inner.send_payment(req.clone()))
            .await
    }

    async fn health(&self) -> Result<(), DaemonError> {
        self.inner.health().await
    }
}
