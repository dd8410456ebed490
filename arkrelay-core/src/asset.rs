//! C11 Asset Manager — CRUD for the fungible asset registry, balances,
//! mint/transfer bookkeeping (spec.md §4.11).

use std::sync::Arc;

use arkrelay_daemons::TapdDaemonRpc;
use arkrelay_store::{Asset, AssetBalance, AssetType, Store};

use crate::error::{OrchestrationError, OrchestrationResult};

pub struct AssetManager {
    store: Arc<Store>,
    tapd: Arc<dyn TapdDaemonRpc>,
}

impl AssetManager {
    pub fn new(store: Arc<Store>, tapd: Arc<dyn TapdDaemonRpc>) -> Self {
        Self { store, tapd }
    }

    /// Registers `asset_id` locally once the Taproot-asset daemon confirms
    /// it genuinely exists in its universe (spec §2 Tapd `ListAssets`) — the
    /// registry never invents bookkeeping for an asset the daemon doesn't
    /// know about.
    pub async fn create(
        &self,
        asset_id: &str,
        name: &str,
        ticker: &str,
        asset_type: AssetType,
        decimals: i16,
    ) -> OrchestrationResult<Asset> {
        let known = self.tapd.list_assets().await?;
        if !known.assets.iter().any(|a| a.asset_id == asset_id) {
            return Err(OrchestrationError::Validation(format!(
                "asset {asset_id} is not known to the taproot-asset daemon"
            )));
        }

        let mut tx = self.store.begin().await?;
        let asset = tx.create_asset(asset_id, name, ticker, asset_type, decimals).await?;
        tx.commit().await?;
        Ok(asset)
    }

    pub async fn list(&self) -> OrchestrationResult<Vec<Asset>> {
        Ok(self.store.list_assets().await?)
    }

    pub async fn get(&self, asset_id: &str) -> OrchestrationResult<Asset> {
        self.store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| OrchestrationError::Validation(format!("unknown asset {asset_id}")))
    }

    /// Spendable vs. reserved split for admission decisions (spec §4.11
    /// "Reserve-requirement queries").
    pub async fn balance(&self, user_pubkey: &str, asset_id: &str) -> OrchestrationResult<AssetBalance> {
        match self.store.get_balance(user_pubkey, asset_id).await? {
            Some(balance) => Ok(balance),
            None => Ok(AssetBalance {
                user_pubkey: user_pubkey.to_string(),
                asset_id: asset_id.to_string(),
                balance: 0,
                reserved_balance: 0,
            }),
        }
    }

    /// Grows `total_supply` and credits `recipient` within one transaction.
    pub async fn mint(&self, asset_id: &str, recipient: &str, amount: i64) -> OrchestrationResult<()> {
        if amount <= 0 {
            return Err(OrchestrationError::Validation("mint amount must be positive".to_string()));
        }
        let mut tx = self.store.begin().await?;
        tx.mint_asset(asset_id, recipient, amount).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Shrinks `total_supply` and debits `holder` within one transaction
    /// (spec §4.11 "minting/burning bookkeeping").
    pub async fn burn(&self, asset_id: &str, holder: &str, amount: i64) -> OrchestrationResult<()> {
        if amount <= 0 {
            return Err(OrchestrationError::Validation("burn amount must be positive".to_string()));
        }
        let mut tx = self.store.begin().await?;
        if let Err(err) = tx.burn_asset(asset_id, holder, amount).await {
            tx.rollback().await?;
            return Err(err.into());
        }
        tx.commit().await?;
        Ok(())
    }

    /// Debits `sender` and credits `recipient` by `amount`, atomically
    /// (spec §4.11 "exactly two AssetBalance rows ... within one
    /// transaction").
    pub async fn transfer(
        &self,
        sender: &str,
        recipient: &str,
        asset_id: &str,
        amount: i64,
    ) -> OrchestrationResult<()> {
        if amount <= 0 {
            return Err(OrchestrationError::Validation("transfer amount must be positive".to_string()));
        }
        let mut tx = self.store.begin().await?;
        if let Err(err) = tx.transfer_balance(sender, recipient, asset_id, amount).await {
            tx.rollback().await?;
            return Err(err.into());
        }
        tx.commit().await?;
        Ok(())
    }
}
