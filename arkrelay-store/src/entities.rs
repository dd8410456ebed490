//! The entities of spec §3, modeled as rows with FK-by-opaque-id.
//!
//! No in-memory back-pointers: a VTXO that names a `spending_txid` does not
//! hold a `Transaction`, it holds a string the store can look up. Traversal
//! always goes back through [`crate::Store`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Error returned when a stored string doesn't match any known enum variant.
#[derive(Debug, thiserror::Error)]
#[error("unrecognized {kind} value: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Native,
    Permissionless,
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetType::Native => write!(f, "native"),
            AssetType::Permissionless => write!(f, "permissionless"),
        }
    }
}

impl FromStr for AssetType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(AssetType::Native),
            "permissionless" => Ok(AssetType::Permissionless),
            _ => Err(UnknownVariant {
                kind: "AssetType",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: String,
    pub name: String,
    pub ticker: String,
    #[sqlx(try_from = "String")]
    pub asset_type: AssetTypeColumn,
    pub decimals: i16,
    pub total_supply: i64,
    pub is_active: bool,
    /// Watermark for the C9 L1 settlement coordinator; `None` means this
    /// asset has never been settled to L1.
    pub last_l1_commitment_at: Option<DateTime<Utc>>,
}

/// Thin wrapper so `sqlx::FromRow`'s `try_from = "String"` column conversion
/// can target a type we own (sqlx requires `TryFrom<String>` on the field
/// type itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetTypeColumn(pub AssetType);

impl TryFrom<String> for AssetTypeColumn {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AssetType::from_str(&value).map(AssetTypeColumn)
    }
}

impl fmt::Display for AssetTypeColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-identity balance. Invariant: `balance >= reserved_balance >= 0`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AssetBalance {
    pub user_pubkey: String,
    pub asset_id: String,
    pub balance: i64,
    pub reserved_balance: i64,
}

impl AssetBalance {
    /// `balance - reserved_balance`. Never negative if the invariant holds.
    pub fn spendable(&self) -> i64 {
        self.balance - self.reserved_balance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VtxoStatus {
    Available,
    Assigned,
    Spent,
    Expired,
}

impl VtxoStatus {
    /// True once a VTXO can no longer move to any other state.
    pub fn is_terminal(self) -> bool {
        matches!(self, VtxoStatus::Spent | VtxoStatus::Expired)
    }

    /// Whether `self -> next` is a legal monotone transition per spec §3/§8:
    /// `available < assigned < spent` and `available < expired`; no backward
    /// edge, and `spent`/`expired` are terminal.
    pub fn can_transition_to(self, next: VtxoStatus) -> bool {
        use VtxoStatus::*;
        matches!(
            (self, next),
            (Available, Assigned) | (Available, Expired) | (Assigned, Spent) | (Assigned, Expired)
        )
    }
}

impl fmt::Display for VtxoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VtxoStatus::Available => "available",
            VtxoStatus::Assigned => "assigned",
            VtxoStatus::Spent => "spent",
            VtxoStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

impl FromStr for VtxoStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(VtxoStatus::Available),
            "assigned" => Ok(VtxoStatus::Assigned),
            "spent" => Ok(VtxoStatus::Spent),
            "expired" => Ok(VtxoStatus::Expired),
            _ => Err(UnknownVariant {
                kind: "VtxoStatus",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for VtxoStatus {
    type Error = UnknownVariant;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

/// A virtual unspent output: the gateway's accounting of a spendable leaf.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Vtxo {
    pub vtxo_id: String,
    pub txid: String,
    pub vout: i32,
    pub amount_sats: i64,
    pub script_pubkey: String,
    pub asset_id: String,
    pub user_pubkey: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: VtxoStatus,
    pub expires_at: DateTime<Utc>,
    pub spending_txid: Option<String>,
    /// Bumped on every status/ownership mutation; backs the L1 settlement
    /// coordinator's "since last run" filter (spec §4.9).
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    P2pTransfer,
    LightningLift,
    LightningLand,
    ProtocolOp,
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionType::P2pTransfer => "p2p_transfer",
            SessionType::LightningLift => "lightning_lift",
            SessionType::LightningLand => "lightning_land",
            SessionType::ProtocolOp => "protocol_op",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SessionType {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p2p_transfer" => Ok(SessionType::P2pTransfer),
            "lightning_lift" => Ok(SessionType::LightningLift),
            "lightning_land" => Ok(SessionType::LightningLand),
            "protocol_op" => Ok(SessionType::ProtocolOp),
            _ => Err(UnknownVariant {
                kind: "SessionType",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for SessionType {
    type Error = UnknownVariant;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

/// The session state machine of spec §4.5. Aliases (`pending`,
/// `response_received`) are accepted on *parse* only; [`fmt::Display`]
/// always emits the canonical name (see DESIGN.md, Open Question 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initiated,
    ChallengeSent,
    AwaitingSignature,
    Signing,
    Completed,
    Failed,
    Expired,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Expired
        )
    }

    /// Legal edges per the §4.5 transition table. `Failed`/`Expired` are
    /// reachable from any non-terminal state; all other edges are a strict
    /// linear chain.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        if self.is_terminal() {
            return false;
        }
        match next {
            Failed | Expired => true,
            Initiated => false,
            ChallengeSent => self == Initiated,
            AwaitingSignature => self == ChallengeSent,
            Signing => self == AwaitingSignature,
            Completed => self == Signing,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Initiated => "initiated",
            SessionStatus::ChallengeSent => "challenge_sent",
            SessionStatus::AwaitingSignature => "awaiting_signature",
            SessionStatus::Signing => "signing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" | "pending" => Ok(SessionStatus::Initiated),
            "challenge_sent" => Ok(SessionStatus::ChallengeSent),
            "awaiting_signature" | "response_received" => Ok(SessionStatus::AwaitingSignature),
            "signing" => Ok(SessionStatus::Signing),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "expired" => Ok(SessionStatus::Expired),
            _ => Err(UnknownVariant {
                kind: "SessionStatus",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for SessionStatus {
    type Error = UnknownVariant;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

/// One intent's execution context.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SigningSession {
    pub session_id: String,
    pub user_pubkey: String,
    pub action_id: String,
    #[sqlx(try_from = "String")]
    pub session_type: SessionType,
    #[sqlx(try_from = "String")]
    pub status: SessionStatus,
    pub intent_data: Value,
    /// The full signed `intent` payload (action_id, type, params, expires_at)
    /// as received, kept alongside `intent_data` so a ceremony can re-check
    /// the original's freshness and schema before it resumes a step.
    pub intent_envelope: Value,
    pub context: String,
    pub expires_at: DateTime<Utc>,
    pub result_data: Option<Value>,
    pub signed_tx: Option<String>,
    /// Idempotency marker per DESIGN.md / spec §9: "last completed step".
    pub last_completed_step: i16,
    /// Cooperative-cancellation flag (spec §5).
    pub cancel_requested: bool,
}

/// A single signature request within a session.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SigningChallenge {
    pub challenge_id: String,
    pub session_id: String,
    pub challenge_data: Vec<u8>,
    pub context: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub signature: Option<Vec<u8>>,
    pub step_index: Option<i16>,
    pub step_total: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Prepared,
    Broadcast,
    Confirmed,
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Prepared => "prepared",
            TransactionStatus::Broadcast => "broadcast",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prepared" => Ok(TransactionStatus::Prepared),
            "broadcast" => Ok(TransactionStatus::Broadcast),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(UnknownVariant {
                kind: "TransactionStatus",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = UnknownVariant;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

/// A produced/broadcast transaction record.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub session_id: String,
    pub tx_type: String,
    pub raw_tx: Vec<u8>,
    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,
    pub amount_sats: i64,
    pub fee_sats: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Settled,
    Failed,
    Expired,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Settled => "settled",
            InvoiceStatus::Failed => "failed",
            InvoiceStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

impl FromStr for InvoiceStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvoiceStatus::Pending),
            "settled" => Ok(InvoiceStatus::Settled),
            "failed" => Ok(InvoiceStatus::Failed),
            "expired" => Ok(InvoiceStatus::Expired),
            _ => Err(UnknownVariant {
                kind: "InvoiceStatus",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = UnknownVariant;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Lift,
    Land,
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceType::Lift => write!(f, "lift"),
            InvoiceType::Land => write!(f, "land"),
        }
    }
}

impl FromStr for InvoiceType {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lift" => Ok(InvoiceType::Lift),
            "land" => Ok(InvoiceType::Land),
            _ => Err(UnknownVariant {
                kind: "InvoiceType",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for InvoiceType {
    type Error = UnknownVariant;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

/// A Lightning-layer claim.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LightningInvoice {
    pub payment_hash: String,
    pub bolt11_invoice: String,
    pub session_id: Option<String>,
    pub amount_sats: i64,
    pub asset_id: String,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    #[sqlx(try_from = "String")]
    pub invoice_type: InvoiceType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_parses_aliases_to_canonical() {
        assert_eq!(
            "pending".parse::<SessionStatus>().unwrap(),
            SessionStatus::Initiated
        );
        assert_eq!(
            "response_received".parse::<SessionStatus>().unwrap(),
            SessionStatus::AwaitingSignature
        );
    }

    #[test]
    fn session_status_output_is_always_canonical() {
        assert_eq!(SessionStatus::Initiated.to_string(), "initiated");
        assert_eq!(
            SessionStatus::AwaitingSignature.to_string(),
            "awaiting_signature"
        );
    }

    #[test]
    fn session_status_rejects_illegal_edges() {
        assert!(!SessionStatus::Initiated.can_transition_to(SessionStatus::Signing));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Failed));
        assert!(SessionStatus::Signing.can_transition_to(SessionStatus::Failed));
    }

    #[test]
    fn vtxo_status_is_monotone() {
        assert!(VtxoStatus::Available.can_transition_to(VtxoStatus::Assigned));
        assert!(VtxoStatus::Assigned.can_transition_to(VtxoStatus::Spent));
        assert!(!VtxoStatus::Spent.can_transition_to(VtxoStatus::Available));
        assert!(!VtxoStatus::Assigned.can_transition_to(VtxoStatus::Available));
    }
}
