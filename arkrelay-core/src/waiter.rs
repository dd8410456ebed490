//! Bridges C4 (inbound `signing_response` events) to C7 (a ceremony task
//! parked at the step-4 suspension point). Generalizes the
//! `subscribe_send`/`subscribe_receive` notifier-stream wait pattern used
//! for "wait for a state-machine transition" in
//! `gateway/ln-gateway/src/gateway_module_v2/mod.rs` to "wait for a
//! specific challenge's response".

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};

use arkrelay_relay::SigningResponsePayload;

use crate::error::OrchestrationError;

pub type ResponseOutcome = Result<SigningResponsePayload, OrchestrationError>;

#[derive(Default)]
pub struct ResponseWaiter {
    pending: Mutex<HashMap<String, oneshot::Sender<ResponseOutcome>>>,
}

impl ResponseWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `challenge_id`'s response. The returned
    /// receiver resolves exactly once: when [`Self::resolve`] is called, or
    /// is dropped (yielding a `RecvError`) if the waiter is torn down
    /// first.
    pub async fn register(&self, challenge_id: String) -> oneshot::Receiver<ResponseOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(challenge_id, tx);
        rx
    }

    /// Delivers `outcome` to whoever is waiting on `challenge_id`, if
    /// anyone still is. Returns `false` if nobody was registered (the
    /// ceremony already gave up, or the response arrived for an unknown
    /// challenge).
    pub async fn resolve(&self, challenge_id: &str, outcome: ResponseOutcome) -> bool {
        if let Some(tx) = self.pending.lock().await.remove(challenge_id) {
            tx.send(outcome).is_ok()
        } else {
            false
        }
    }

    /// Drops a stale registration once a ceremony stops waiting (deadline
    /// exceeded), so a late response can't resolve a channel nobody reads.
    pub async fn cancel(&self, challenge_id: &str) {
        self.pending.lock().await.remove(challenge_id);
    }
}
