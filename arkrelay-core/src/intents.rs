//! Intent `params` schemas per `type` (spec.md §6 "Intent schema
//! constraints", §9 "Dynamic dispatch" — "treat this as a tagged variant
//! with a fixed set of handlers registered at startup").
//!
//! [`EventDispatcher`](crate::dispatch::EventDispatcher) only classifies and
//! stores `params` as an opaque [`serde_json::Value`] on the session row;
//! it is [`SigningOrchestrator`](crate::orchestrator::SigningOrchestrator)
//! that parses it into one of these once a ceremony actually starts,
//! per-`SessionType`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use arkrelay_store::SessionType;

use crate::error::{OrchestrationError, OrchestrationResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct P2pTransferParams {
    pub recipient: String,
    pub asset_id: String,
    pub amount: i64,
    pub fee: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LightningLiftParams {
    pub asset_id: String,
    pub amount_sats: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LightningLandParams {
    pub asset_id: String,
    pub amount_sats: i64,
    pub fee_sats: i64,
    pub payment_hash: String,
    pub bolt11_invoice: String,
}

/// `protocol_op`'s params: a solver already produced the raw transaction
/// and the payload the wallet must sign; the core only collects the
/// signature and finalizes bookkeeping (spec §9: "run steps 1 and 4-6 with
/// solver-supplied payloads").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolOpParams {
    pub asset_id: String,
    pub input_vtxo_ids: Vec<String>,
    pub output_vtxo_id: Option<String>,
    pub output_amount_sats: Option<i64>,
    pub output_owner: Option<String>,
    #[serde(with = "hex::serde")]
    pub raw_tx: Vec<u8>,
    pub txid: String,
    #[serde(with = "hex::serde")]
    pub payload_to_sign: Vec<u8>,
}

fn parse<T: serde::de::DeserializeOwned>(params: &Value) -> OrchestrationResult<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| OrchestrationError::Validation(format!("malformed intent params: {e}")))
}

pub enum ParsedIntent {
    P2pTransfer(P2pTransferParams),
    LightningLift(LightningLiftParams),
    LightningLand(LightningLandParams),
    ProtocolOp(ProtocolOpParams),
}

/// Looks up the fixed handler for `session_type` and parses `params`
/// against its schema.
pub fn parse_intent(session_type: SessionType, params: &Value) -> OrchestrationResult<ParsedIntent> {
    match session_type {
        SessionType::P2pTransfer => Ok(ParsedIntent::P2pTransfer(parse(params)?)),
        SessionType::LightningLift => Ok(ParsedIntent::LightningLift(parse(params)?)),
        SessionType::LightningLand => Ok(ParsedIntent::LightningLand(parse(params)?)),
        SessionType::ProtocolOp => Ok(ParsedIntent::ProtocolOp(parse(params)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn p2p_transfer_parses_matching_schema() {
        let params = json!({
            "recipient": "npub1abc",
            "asset_id": "usd",
            "amount": 500,
            "fee": 10,
        });
        match parse_intent(SessionType::P2pTransfer, &params).unwrap() {
            ParsedIntent::P2pTransfer(p) => {
                assert_eq!(p.recipient, "npub1abc");
                assert_eq!(p.amount, 500);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn missing_required_field_is_a_validation_error() {
        let params = json!({ "asset_id": "usd", "amount": 500, "fee": 10 });
        let err = parse_intent(SessionType::P2pTransfer, &params).unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation(_)));
    }

    #[test]
    fn protocol_op_hex_fields_roundtrip() {
        let params = json!({
            "asset_id": "usd",
            "input_vtxo_ids": ["vtxo-1"],
            "output_vtxo_id": null,
            "output_amount_sats": null,
            "output_owner": null,
            "raw_tx": "deadbeef",
            "txid": "tx-1",
            "payload_to_sign": "cafe",
        });
        match parse_intent(SessionType::ProtocolOp, &params).unwrap() {
            ParsedIntent::ProtocolOp(p) => {
                assert_eq!(p.raw_tx, vec![0xde, 0xad, 0xbe, 0xef]);
                assert_eq!(p.payload_to_sign, vec![0xca, 0xfe]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn protocol_op_rejects_non_hex_raw_tx() {
        let params = json!({
            "asset_id": "usd",
            "input_vtxo_ids": [],
            "output_vtxo_id": null,
            "output_amount_sats": null,
            "output_owner": null,
            "raw_tx": "not-hex",
            "txid": "tx-1",
            "payload_to_sign": "cafe",
        });
        assert!(parse_intent(SessionType::ProtocolOp, &params).is_err());
    }

    #[test]
    fn lightning_land_parses_matching_schema() {
        let params = json!({
            "asset_id": "usd",
            "amount_sats": 100_000,
            "fee_sats": 100,
            "payment_hash": "hash1",
            "bolt11_invoice": "lnbc1...",
        });
        match parse_intent(SessionType::LightningLand, &params).unwrap() {
            ParsedIntent::LightningLand(p) => assert_eq!(p.fee_sats, 100),
            _ => panic!("wrong variant"),
        }
    }
}
