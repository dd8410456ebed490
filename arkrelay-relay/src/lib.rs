//! C3 Relay Client — connects to N overlay relays, subscribes to events
//! addressed to the gateway identity, publishes public events, sends/
//! receives encrypted direct messages (spec.md §4.3).

pub mod client;
pub mod dedupe;
pub mod error;
pub mod event;
pub mod kinds;

pub use client::RelayClient;
pub use error::{RelayError, RelayResult};
pub use event::{
    ChallengeKind, ConfirmationPayload, FailurePayload, IntentPayload, L1CommitmentPayload,
    RelayEvent, SigningChallengePayload, SigningResponsePayload,
};
pub use kinds::EventKind;
