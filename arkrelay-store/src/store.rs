//! C1 Data Store: transactional acquire/release over Postgres.
//!
//! Mirrors the way the teacher threads a single `Database` handle through
//! every mutating service (`fedimint-server/src/config/api.rs`'s
//! `ConfigGenApi` holds one `Database` and every method that mutates state
//! takes a transaction). Here [`Store::begin`] hands out a [`StoreTx`]; all
//! multi-row mutations that touch balances, VTXOs, or session state happen
//! through one `StoreTx` and are committed atomically.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::entities::*;
use crate::error::{StoreError, StoreResult};

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

/// Input to [`StoreTx::insert_vtxo_batch`] — a VTXO not yet assigned an
/// owner, as produced by an Ark daemon batch or a settled Lightning lift.
pub struct NewVtxo {
    pub vtxo_id: String,
    pub txid: String,
    pub vout: i32,
    pub amount_sats: i64,
    pub script_pubkey: String,
    pub asset_id: String,
    pub user_pubkey: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub struct NewTransaction {
    pub txid: String,
    pub session_id: String,
    pub tx_type: String,
    pub raw_tx: Vec<u8>,
    pub status: TransactionStatus,
    pub amount_sats: i64,
    pub fee_sats: i64,
}

pub struct NewLightningInvoice {
    pub payment_hash: String,
    pub bolt11_invoice: String,
    pub session_id: Option<String>,
    pub amount_sats: i64,
    pub asset_id: String,
    pub invoice_type: InvoiceType,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn begin(&self) -> StoreResult<StoreTx<'_>> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }

    // --- read-only lookups, no transaction required ---

    pub async fn get_asset(&self, asset_id: &str) -> StoreResult<Option<Asset>> {
        let asset = sqlx::query_as::<_, Asset>("SELECT * FROM assets WHERE asset_id = $1")
            .bind(asset_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(asset)
    }

    pub async fn list_assets(&self) -> StoreResult<Vec<Asset>> {
        let assets = sqlx::query_as::<_, Asset>("SELECT * FROM assets ORDER BY asset_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(assets)
    }

    pub async fn get_balance(
        &self,
        user_pubkey: &str,
        asset_id: &str,
    ) -> StoreResult<Option<AssetBalance>> {
        let balance = sqlx::query_as::<_, AssetBalance>(
            "SELECT * FROM asset_balances WHERE user_pubkey = $1 AND asset_id = $2",
        )
        .bind(user_pubkey)
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance)
    }

    pub async fn get_session(&self, session_id: &str) -> StoreResult<Option<SigningSession>> {
        let session =
            sqlx::query_as::<_, SigningSession>("SELECT * FROM signing_sessions WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    /// Idempotency lookup keyed by `(author, action_id)` per spec §6/§8.
    pub async fn get_session_by_action(
        &self,
        user_pubkey: &str,
        action_id: &str,
    ) -> StoreResult<Option<SigningSession>> {
        let session = sqlx::query_as::<_, SigningSession>(
            "SELECT * FROM signing_sessions WHERE user_pubkey = $1 AND action_id = $2",
        )
        .bind(user_pubkey)
        .bind(action_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    pub async fn get_challenge(&self, challenge_id: &str) -> StoreResult<Option<SigningChallenge>> {
        let challenge = sqlx::query_as::<_, SigningChallenge>(
            "SELECT * FROM signing_challenges WHERE challenge_id = $1",
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(challenge)
    }

    pub async fn latest_challenge_for_session(
        &self,
        session_id: &str,
    ) -> StoreResult<Option<SigningChallenge>> {
        let challenge = sqlx::query_as::<_, SigningChallenge>(
            "SELECT * FROM signing_challenges WHERE session_id = $1 \
             ORDER BY step_index DESC NULLS LAST LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(challenge)
    }

    pub async fn get_transaction(&self, txid: &str) -> StoreResult<Option<crate::entities::Transaction>> {
        let transaction = sqlx::query_as::<_, crate::entities::Transaction>(
            "SELECT * FROM transactions WHERE txid = $1",
        )
        .bind(txid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(transaction)
    }

    pub async fn get_invoice(&self, payment_hash: &str) -> StoreResult<Option<LightningInvoice>> {
        let invoice = sqlx::query_as::<_, LightningInvoice>(
            "SELECT * FROM lightning_invoices WHERE payment_hash = $1",
        )
        .bind(payment_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(invoice)
    }

    /// VTXOs for `asset_id` touched since `since` (or all of them, if
    /// `since` is `None`). Backs the C9 L1 settlement coordinator's Merkle
    /// tree construction: only state that changed since the coordinator's
    /// last pass needs a fresh commitment (spec §4.9 "pull the list of
    /// settled L2 state changes since the last run").
    pub async fn list_vtxos_for_asset(
        &self,
        asset_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Vtxo>> {
        let vtxos = match since {
            Some(since) => {
                sqlx::query_as::<_, Vtxo>(
                    "SELECT * FROM vtxos WHERE asset_id = $1 AND updated_at > $2 ORDER BY vtxo_id",
                )
                .bind(asset_id)
                .bind(since)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Vtxo>("SELECT * FROM vtxos WHERE asset_id = $1 ORDER BY vtxo_id")
                    .bind(asset_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(vtxos)
    }

    pub async fn count_available_vtxos(&self, asset_id: &str) -> StoreResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM vtxos WHERE asset_id = $1 AND status = 'available'",
        )
        .bind(asset_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Sessions that are not yet terminal but have passed `expires_at`.
    /// Backs the C5 background sweeper.
    pub async fn list_expired_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SigningSession>> {
        let sessions = sqlx::query_as::<_, SigningSession>(
            "SELECT * FROM signing_sessions \
             WHERE status NOT IN ('completed', 'failed', 'expired') AND expires_at < $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    /// Assigned VTXOs past `expires_at` with no live (non-terminal) session
    /// referencing them through an intent — backs the C9 expiration sweeper.
    pub async fn list_expired_assigned_vtxos(&self, now: DateTime<Utc>) -> StoreResult<Vec<Vtxo>> {
        let vtxos = sqlx::query_as::<_, Vtxo>(
            "SELECT v.* FROM vtxos v \
             WHERE v.status = 'assigned' AND v.expires_at < $1 \
             AND NOT EXISTS ( \
                 SELECT 1 FROM signing_sessions s \
                 WHERE s.user_pubkey = v.user_pubkey \
                 AND s.status NOT IN ('completed', 'failed', 'expired') \
             )",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(vtxos)
    }

    /// Pending invoices the C10 reconciliation watcher still needs to poll.
    pub async fn list_pending_invoices(&self) -> StoreResult<Vec<LightningInvoice>> {
        let invoices = sqlx::query_as::<_, LightningInvoice>(
            "SELECT * FROM lightning_invoices WHERE status = 'pending'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(invoices)
    }

    pub async fn count_non_terminal_sessions(&self) -> StoreResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM signing_sessions \
             WHERE status NOT IN ('completed', 'failed', 'expired')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }
}

/// A single atomic unit of work. Every method either fully applies or,
/// on error, leaves the eventual `ROLLBACK` (dropping without `commit`)
/// to undo nothing already visible to other transactions.
pub struct StoreTx<'a> {
    tx: Transaction<'a, Postgres>,
}

impl<'a> StoreTx<'a> {
    pub async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    /// Creates a session, enforcing the `(user_pubkey, action_id)`
    /// uniqueness invariant. If a session already exists for this key, it is
    /// returned unchanged rather than erroring — this is what makes intent
    /// replay idempotent (spec §8 "Idempotency of intent receipt").
    #[allow(clippy::too_many_arguments)]
    pub async fn create_session(
        &mut self,
        user_pubkey: &str,
        action_id: &str,
        session_type: SessionType,
        intent_data: serde_json::Value,
        intent_envelope: serde_json::Value,
        context: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<SigningSession> {
        if let Some(existing) = sqlx::query_as::<_, SigningSession>(
            "SELECT * FROM signing_sessions WHERE user_pubkey = $1 AND action_id = $2",
        )
        .bind(user_pubkey)
        .bind(action_id)
        .fetch_optional(&mut *self.tx)
        .await?
        {
            return Ok(existing);
        }

        let session_id = Uuid::new_v4().to_string();
        let session = sqlx::query_as::<_, SigningSession>(
            "INSERT INTO signing_sessions \
             (session_id, user_pubkey, action_id, session_type, status, intent_data, \
              intent_envelope, context, expires_at, result_data, signed_tx, \
              last_completed_step, cancel_requested) \
             VALUES ($1, $2, $3, $4, 'initiated', $5, $6, $7, $8, NULL, NULL, 0, false) \
             RETURNING *",
        )
        .bind(&session_id)
        .bind(user_pubkey)
        .bind(action_id)
        .bind(session_type.to_string())
        .bind(intent_data)
        .bind(intent_envelope)
        .bind(context)
        .bind(expires_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(session)
    }

    /// Requests `from -> to`. Rejects the request (without mutating
    /// anything) if `from` doesn't match the persisted status or the edge
    /// isn't legal per [`SessionStatus::can_transition_to`] — C5 is the sole
    /// mutator and every transition is checked here.
    pub async fn transition_session(
        &mut self,
        session_id: &str,
        to: SessionStatus,
    ) -> StoreResult<SigningSession> {
        let current = sqlx::query_as::<_, SigningSession>(
            "SELECT * FROM signing_sessions WHERE session_id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::NotFound("signing_sessions"))?;

        if !current.status.can_transition_to(to) {
            return Err(StoreError::IllegalTransition {
                from: current.status.to_string(),
                to: to.to_string(),
            });
        }

        let updated = sqlx::query_as::<_, SigningSession>(
            "UPDATE signing_sessions SET status = $2 WHERE session_id = $1 RETURNING *",
        )
        .bind(session_id)
        .bind(to.to_string())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(updated)
    }

    pub async fn set_last_completed_step(
        &mut self,
        session_id: &str,
        step: i16,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE signing_sessions SET last_completed_step = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(step)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn set_result(
        &mut self,
        session_id: &str,
        result_data: serde_json::Value,
        signed_tx: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE signing_sessions SET result_data = $2, signed_tx = $3 WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(result_data)
        .bind(signed_tx)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn request_cancel(&mut self, session_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE signing_sessions SET cancel_requested = true WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn create_challenge(
        &mut self,
        session_id: &str,
        challenge_data: &[u8],
        context: &str,
        expires_at: DateTime<Utc>,
        step_index: Option<i16>,
        step_total: Option<i16>,
    ) -> StoreResult<SigningChallenge> {
        let challenge_id = Uuid::new_v4().to_string();
        let challenge = sqlx::query_as::<_, SigningChallenge>(
            "INSERT INTO signing_challenges \
             (challenge_id, session_id, challenge_data, context, expires_at, is_used, \
              signature, step_index, step_total) \
             VALUES ($1, $2, $3, $4, $5, false, NULL, $6, $7) \
             RETURNING *",
        )
        .bind(&challenge_id)
        .bind(session_id)
        .bind(challenge_data)
        .bind(context)
        .bind(expires_at)
        .bind(step_index)
        .bind(step_total)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(challenge)
    }

    /// Atomically marks a challenge used and stores its signature. The
    /// `WHERE is_used = false` makes this the single winner among
    /// concurrent responses per spec §4.6 step 4 / §8's challenge law.
    pub async fn use_challenge(
        &mut self,
        challenge_id: &str,
        signature: &[u8],
    ) -> StoreResult<SigningChallenge> {
        let updated = sqlx::query_as::<_, SigningChallenge>(
            "UPDATE signing_challenges SET is_used = true, signature = $2 \
             WHERE challenge_id = $1 AND is_used = false \
             RETURNING *",
        )
        .bind(challenge_id)
        .bind(signature)
        .fetch_optional(&mut *self.tx)
        .await?;

        match updated {
            Some(challenge) => Ok(challenge),
            None => Err(StoreError::Conflict(format!(
                "challenge {challenge_id} already used or missing"
            ))),
        }
    }

    pub async fn insert_vtxo_batch(&mut self, vtxos: Vec<NewVtxo>) -> StoreResult<()> {
        for v in vtxos {
            let status = if v.user_pubkey.is_some() {
                VtxoStatus::Assigned
            } else {
                VtxoStatus::Available
            };
            sqlx::query(
                "INSERT INTO vtxos \
                 (vtxo_id, txid, vout, amount_sats, script_pubkey, asset_id, user_pubkey, \
                  status, expires_at, spending_txid) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL)",
            )
            .bind(&v.vtxo_id)
            .bind(&v.txid)
            .bind(v.vout)
            .bind(v.amount_sats)
            .bind(&v.script_pubkey)
            .bind(&v.asset_id)
            .bind(&v.user_pubkey)
            .bind(status.to_string())
            .bind(v.expires_at)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    /// Smallest-fit assignment per spec §4.9: locks candidate rows
    /// (`FOR UPDATE`) so two concurrent assignments can never pick the same
    /// VTXO, selects the smallest combination whose sum covers
    /// `amount_needed`, flips them to `assigned`, and reserves the sum on
    /// the owner's balance — all within this transaction.
    pub async fn assign_vtxos(
        &mut self,
        user_pubkey: &str,
        asset_id: &str,
        amount_needed: i64,
    ) -> StoreResult<Vec<Vtxo>> {
        let candidates = sqlx::query_as::<_, Vtxo>(
            "SELECT * FROM vtxos WHERE asset_id = $1 AND status = 'available' \
             ORDER BY amount_sats ASC FOR UPDATE SKIP LOCKED",
        )
        .bind(asset_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut chosen = Vec::new();
        let mut sum: i64 = 0;
        for vtxo in candidates {
            if sum >= amount_needed {
                break;
            }
            sum += vtxo.amount_sats;
            chosen.push(vtxo);
        }

        if sum < amount_needed {
            return Err(StoreError::InsufficientInventory {
                requested: amount_needed,
                available: sum,
            });
        }

        for vtxo in &chosen {
            sqlx::query(
                "UPDATE vtxos SET status = 'assigned', user_pubkey = $2, updated_at = now() \
                 WHERE vtxo_id = $1",
            )
            .bind(&vtxo.vtxo_id)
            .bind(user_pubkey)
            .execute(&mut *self.tx)
            .await?;
        }

        self.adjust_balance(user_pubkey, asset_id, 0, sum).await?;

        let mut assigned = chosen;
        for vtxo in &mut assigned {
            vtxo.status = VtxoStatus::Assigned;
            vtxo.user_pubkey = Some(user_pubkey.to_string());
        }
        Ok(assigned)
    }

    /// Transitions VTXOs `assigned -> spent`, releasing their reserve and
    /// debiting the owner's balance by the same sum (spec §4.9 "Spending").
    pub async fn mark_vtxos_spent(
        &mut self,
        vtxo_ids: &[String],
        spending_txid: &str,
    ) -> StoreResult<()> {
        let mut by_owner_asset: std::collections::HashMap<(String, String), i64> =
            std::collections::HashMap::new();

        for vtxo_id in vtxo_ids {
            let vtxo = sqlx::query_as::<_, Vtxo>("SELECT * FROM vtxos WHERE vtxo_id = $1 FOR UPDATE")
                .bind(vtxo_id)
                .fetch_optional(&mut *self.tx)
                .await?
                .ok_or(StoreError::NotFound("vtxos"))?;

            if !vtxo.status.can_transition_to(VtxoStatus::Spent) {
                return Err(StoreError::IllegalTransition {
                    from: vtxo.status.to_string(),
                    to: VtxoStatus::Spent.to_string(),
                });
            }
            let owner = vtxo
                .user_pubkey
                .clone()
                .ok_or_else(|| StoreError::InvariantViolation(format!("{vtxo_id} has no owner")))?;

            sqlx::query(
                "UPDATE vtxos SET status = 'spent', spending_txid = $2, updated_at = now() \
                 WHERE vtxo_id = $1",
            )
            .bind(vtxo_id)
            .bind(spending_txid)
            .execute(&mut *self.tx)
            .await?;

            *by_owner_asset
                .entry((owner, vtxo.asset_id.clone()))
                .or_insert(0) += vtxo.amount_sats;
        }

        for ((owner, asset_id), amount) in by_owner_asset {
            self.adjust_balance(&owner, &asset_id, -amount, -amount)
                .await?;
        }
        Ok(())
    }

    pub async fn mark_vtxo_expired(&mut self, vtxo_id: &str) -> StoreResult<()> {
        let vtxo = sqlx::query_as::<_, Vtxo>("SELECT * FROM vtxos WHERE vtxo_id = $1 FOR UPDATE")
            .bind(vtxo_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::NotFound("vtxos"))?;

        if !vtxo.status.can_transition_to(VtxoStatus::Expired) {
            return Err(StoreError::IllegalTransition {
                from: vtxo.status.to_string(),
                to: VtxoStatus::Expired.to_string(),
            });
        }

        sqlx::query("UPDATE vtxos SET status = 'expired', updated_at = now() WHERE vtxo_id = $1")
            .bind(vtxo_id)
            .execute(&mut *self.tx)
            .await?;

        if let Some(owner) = &vtxo.user_pubkey {
            self.adjust_balance(owner, &vtxo.asset_id, 0, -vtxo.amount_sats)
                .await?;
        }
        Ok(())
    }

    /// Applies `delta_balance`/`delta_reserved` to a `(user_pubkey,
    /// asset_id)` row, creating it at zero first if absent, and rejects the
    /// change if it would violate `balance >= reserved_balance >= 0`.
    pub async fn adjust_balance(
        &mut self,
        user_pubkey: &str,
        asset_id: &str,
        delta_balance: i64,
        delta_reserved: i64,
    ) -> StoreResult<AssetBalance> {
        sqlx::query(
            "INSERT INTO asset_balances (user_pubkey, asset_id, balance, reserved_balance) \
             VALUES ($1, $2, 0, 0) ON CONFLICT (user_pubkey, asset_id) DO NOTHING",
        )
        .bind(user_pubkey)
        .bind(asset_id)
        .execute(&mut *self.tx)
        .await?;

        let current = sqlx::query_as::<_, AssetBalance>(
            "SELECT * FROM asset_balances WHERE user_pubkey = $1 AND asset_id = $2 FOR UPDATE",
        )
        .bind(user_pubkey)
        .bind(asset_id)
        .fetch_one(&mut *self.tx)
        .await?;

        let new_balance = current.balance + delta_balance;
        let new_reserved = current.reserved_balance + delta_reserved;
        if new_balance < 0 || new_reserved < 0 || new_reserved > new_balance {
            return Err(StoreError::InvariantViolation(format!(
                "balance invariant violated for {user_pubkey}/{asset_id}: \
                 balance={new_balance} reserved={new_reserved}"
            )));
        }

        let updated = sqlx::query_as::<_, AssetBalance>(
            "UPDATE asset_balances SET balance = $3, reserved_balance = $4 \
             WHERE user_pubkey = $1 AND asset_id = $2 RETURNING *",
        )
        .bind(user_pubkey)
        .bind(asset_id)
        .bind(new_balance)
        .bind(new_reserved)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(updated)
    }

    /// Moves `amount` of `asset_id` from `sender` to `recipient`'s spendable
    /// balance. Exactly two rows change, within this transaction (spec
    /// §4.11).
    pub async fn transfer_balance(
        &mut self,
        sender: &str,
        recipient: &str,
        asset_id: &str,
        amount: i64,
    ) -> StoreResult<()> {
        self.adjust_balance(sender, asset_id, -amount, 0).await?;
        self.adjust_balance(recipient, asset_id, amount, 0).await?;
        Ok(())
    }

    /// Mints `amount` to `recipient` and grows the asset's `total_supply`
    /// by the same amount (spec §4.11).
    pub async fn mint_asset(
        &mut self,
        asset_id: &str,
        recipient: &str,
        amount: i64,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE assets SET total_supply = total_supply + $2 WHERE asset_id = $1")
            .bind(asset_id)
            .bind(amount)
            .execute(&mut *self.tx)
            .await?;
        self.adjust_balance(recipient, asset_id, amount, 0).await?;
        Ok(())
    }

    /// Burns `amount` from `holder` and shrinks the asset's `total_supply`
    /// by the same amount (spec §4.11). The `total_supply >= 0` and balance
    /// invariant checks (via `adjust_balance`) reject an over-burn.
    pub async fn burn_asset(
        &mut self,
        asset_id: &str,
        holder: &str,
        amount: i64,
    ) -> StoreResult<()> {
        self.adjust_balance(holder, asset_id, -amount, 0).await?;
        sqlx::query("UPDATE assets SET total_supply = total_supply - $2 WHERE asset_id = $1")
            .bind(asset_id)
            .bind(amount)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn insert_transaction(
        &mut self,
        new_tx: NewTransaction,
    ) -> StoreResult<crate::entities::Transaction> {
        let transaction = sqlx::query_as::<_, crate::entities::Transaction>(
            "INSERT INTO transactions \
             (txid, session_id, tx_type, raw_tx, status, amount_sats, fee_sats) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(&new_tx.txid)
        .bind(&new_tx.session_id)
        .bind(&new_tx.tx_type)
        .bind(&new_tx.raw_tx)
        .bind(new_tx.status.to_string())
        .bind(new_tx.amount_sats)
        .bind(new_tx.fee_sats)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(transaction)
    }

    pub async fn set_transaction_status(
        &mut self,
        txid: &str,
        status: TransactionStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE transactions SET status = $2 WHERE txid = $1")
            .bind(txid)
            .bind(status.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn insert_invoice(
        &mut self,
        new_invoice: NewLightningInvoice,
    ) -> StoreResult<LightningInvoice> {
        let invoice = sqlx::query_as::<_, LightningInvoice>(
            "INSERT INTO lightning_invoices \
             (payment_hash, bolt11_invoice, session_id, amount_sats, asset_id, status, invoice_type) \
             VALUES ($1, $2, $3, $4, $5, 'pending', $6) RETURNING *",
        )
        .bind(&new_invoice.payment_hash)
        .bind(&new_invoice.bolt11_invoice)
        .bind(&new_invoice.session_id)
        .bind(new_invoice.amount_sats)
        .bind(&new_invoice.asset_id)
        .bind(new_invoice.invoice_type.to_string())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(invoice)
    }

    pub async fn set_invoice_status(
        &mut self,
        payment_hash: &str,
        status: InvoiceStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE lightning_invoices SET status = $2 WHERE payment_hash = $1")
            .bind(payment_hash)
            .bind(status.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Advances the C9 L1 settlement watermark for `asset_id` (spec §4.9).
    pub async fn set_last_l1_commitment_at(
        &mut self,
        asset_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE assets SET last_l1_commitment_at = $2 WHERE asset_id = $1")
            .bind(asset_id)
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn create_asset(
        &mut self,
        asset_id: &str,
        name: &str,
        ticker: &str,
        asset_type: AssetType,
        decimals: i16,
    ) -> StoreResult<Asset> {
        let asset = sqlx::query_as::<_, Asset>(
            "INSERT INTO assets (asset_id, name, ticker, asset_type, decimals, total_supply, is_active) \
             VALUES ($1, $2, $3, $4, $5, 0, true) RETURNING *",
        )
        .bind(asset_id)
        .bind(name)
        .bind(ticker)
        .bind(asset_type.to_string())
        .bind(decimals)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(asset)
    }
}
