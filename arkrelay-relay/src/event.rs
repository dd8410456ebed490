use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kinds::EventKind;

/// A decoded inbound event, already signature-checked and, for direct
/// messages, already decrypted. This is the only shape C4 (in
/// `arkrelay-core`) ever sees — it never touches `nostr-sdk` types directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEvent {
    pub event_id: String,
    pub relay_url: String,
    pub author: String,
    pub kind: EventKind,
    pub content: Value,
    pub tags: Vec<(String, String)>,
    pub created_at: DateTime<Utc>,
}

impl RelayEvent {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Required fields of an `intent` event (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentPayload {
    pub action_id: String,
    #[serde(rename = "type")]
    pub intent_type: String,
    pub params: Value,
    pub expires_at: i64,
}

/// Fields of a `signing_challenge` event (gateway -> wallet, DM).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningChallengePayload {
    pub session_id: String,
    #[serde(rename = "type")]
    pub challenge_type: ChallengeKind,
    pub payload_to_sign: String,
    pub payload_ref: String,
    pub algo: String,
    pub domain: String,
    pub context: String,
    pub step_index: Option<u16>,
    pub step_total: Option<u16>,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    SignTx,
    SignPayload,
}

/// Fields of a `signing_response` event (wallet -> gateway, DM).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningResponsePayload {
    pub session_id: String,
    #[serde(rename = "type")]
    pub response_type: ChallengeKind,
    pub signature: String,
    pub payload_ref: String,
}

/// Fields of a `confirmation` event (gateway -> public).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationPayload {
    pub status: String,
    pub ref_action_id: String,
    pub results: Value,
}

/// Fields of a `failure` event (gateway -> wallet, DM).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePayload {
    pub status: String,
    pub code: u16,
    pub message: String,
    pub ref_action_id: String,
}

/// Fields of an `l1_commitment` event (gateway -> public).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L1CommitmentPayload {
    pub l1_txid: String,
    pub block_height: u64,
    pub merkle_root: String,
    pub batch_id: String,
}
