//! Per-subsystem `tracing` targets, matching the teacher's
//! `fedimint_logging::LOG_NET_PEER_DKG`-style target constants
//! (`fedimint-server/src/config/api.rs`).

pub const LOG_DISPATCH: &str = "arkrelay::dispatch";
pub const LOG_SESSION: &str = "arkrelay::session";
pub const LOG_CHALLENGE: &str = "arkrelay::challenge";
pub const LOG_CEREMONY: &str = "arkrelay::ceremony";
pub const LOG_TRANSACTION: &str = "arkrelay::transaction";
pub const LOG_VTXO: &str = "arkrelay::vtxo";
pub const LOG_LIGHTNING: &str = "arkrelay::lightning";
pub const LOG_ASSET: &str = "arkrelay::asset";
pub const LOG_ENGINE: &str = "arkrelay::engine";
