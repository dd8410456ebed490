//! The orchestration engine (spec.md C4-C11): session state machine,
//! six-step signing ceremony, VTXO lifecycle, asset registry, Lightning
//! on/off-ramp, and relay-event dispatch. [`engine::Engine`] wires every
//! collaborator together and owns the background tasks.

pub mod asset;
pub mod challenge;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod intents;
pub mod lightning;
pub mod logging;
pub mod orchestrator;
pub mod ports;
pub mod session;
pub mod transaction;
pub mod vtxo;
pub mod waiter;

pub use engine::Engine;
pub use error::{FailureCode, OrchestrationError, OrchestrationResult};
