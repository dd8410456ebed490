use thiserror::Error;

/// Error kinds a daemon's RPC layer can report, independent of transport.
/// Mirrors the shape of `LightningRpcError` (`gateway/ln-gateway/src/lightning/mod.rs`)
/// but factored so the retry/circuit-breaker wrapper can tell transient
/// transport failures apart from protocol-level rejections (spec §4.2
/// "Error mapping").
#[derive(Debug, Error, Clone)]
pub enum DaemonError {
    /// Transport-level failure: connection refused, DNS failure, stream
    /// reset. Retried by the adapter.
    #[error("{daemon} unavailable: {reason}")]
    Unavailable { daemon: &'static str, reason: String },

    /// The daemon itself rejected the call (bad params, conflict, business
    /// rule violation). Not retried by the adapter — the caller decides.
    #[error("{daemon} rejected {op}: {reason}")]
    Rejected {
        daemon: &'static str,
        op: &'static str,
        reason: String,
    },

    /// The daemon reported a double-spend / confirmation conflict (spec
    /// §7 "Backend conflict").
    #[error("{daemon} conflict on {op}: {reason}")]
    Conflict {
        daemon: &'static str,
        op: &'static str,
        reason: String,
    },

    /// The call did not complete before its deadline.
    #[error("{daemon} timed out on {op}")]
    Timeout { daemon: &'static str, op: &'static str },

    /// The circuit breaker is open; the call was not attempted.
    #[error("{daemon} circuit open")]
    CircuitOpen { daemon: &'static str },
}

impl DaemonError {
    /// Whether the retry loop should attempt again. Only transport-level
    /// unavailability is transient; rejections and conflicts are final.
    pub fn is_transient(&self) -> bool {
        matches!(self, DaemonError::Unavailable { .. } | DaemonError::Timeout { .. })
    }
}
