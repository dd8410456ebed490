use thiserror::Error;

/// The stable error-code set of spec §6, carried end to end from a failed
/// ceremony step to the `failure` event's `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    InvalidAuthorSignature = 1001,
    InsufficientBalance = 2001,
    Conflict = 2002,
    RecipientInvalid = 2003,
    ValidationFailed = 3001,
    BackendUnavailable = 3002,
    StepTimeout = 3003,
    FeeOutputInvalid = 4001,
    SignatureMissing = 4002,
    SignatureInvalid = 4003,
    Cancelled = 5001,
    Expired = 5002,
}

impl FailureCode {
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Error taxonomy of spec §7: validation, precondition, backend transient,
/// backend conflict, timeout, cancelled, internal. The orchestrator is the
/// only component that decides retry/fail-step/fail-session (§7
/// "Propagation policy"); every other component just returns one of these.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("precondition violated: {0}")]
    Precondition { code: FailureCode, message: String },

    #[error("backend daemon unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend conflict: {0}")]
    BackendConflict(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestrationError {
    /// Maps this error to the single failure code published to the user.
    /// Internal errors never surface verbatim (§7) — they still get a code
    /// so the wire `failure` event is well-formed, but the message is
    /// generic.
    pub fn failure_code(&self) -> FailureCode {
        match self {
            OrchestrationError::Validation(_) => FailureCode::ValidationFailed,
            OrchestrationError::Precondition { code, .. } => *code,
            OrchestrationError::BackendUnavailable(_) => FailureCode::BackendUnavailable,
            OrchestrationError::BackendConflict(_) => FailureCode::Conflict,
            OrchestrationError::Timeout(_) => FailureCode::StepTimeout,
            OrchestrationError::Cancelled => FailureCode::Cancelled,
            OrchestrationError::Internal(_) => FailureCode::ValidationFailed,
        }
    }

    /// The message that is safe to publish to the user. Internal errors are
    /// redacted (§7 "never surfaced verbatim").
    pub fn public_message(&self) -> String {
        match self {
            OrchestrationError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn insufficient_balance(message: impl Into<String>) -> Self {
        OrchestrationError::Precondition {
            code: FailureCode::InsufficientBalance,
            message: message.into(),
        }
    }

    pub fn recipient_invalid(message: impl Into<String>) -> Self {
        OrchestrationError::Precondition {
            code: FailureCode::RecipientInvalid,
            message: message.into(),
        }
    }

    pub fn fee_invalid(message: impl Into<String>) -> Self {
        OrchestrationError::Precondition {
            code: FailureCode::FeeOutputInvalid,
            message: message.into(),
        }
    }

    pub fn signature_missing(message: impl Into<String>) -> Self {
        OrchestrationError::Precondition {
            code: FailureCode::SignatureMissing,
            message: message.into(),
        }
    }

    pub fn signature_invalid(message: impl Into<String>) -> Self {
        OrchestrationError::Precondition {
            code: FailureCode::SignatureInvalid,
            message: message.into(),
        }
    }

    pub fn invalid_author_signature(message: impl Into<String>) -> Self {
        OrchestrationError::Precondition {
            code: FailureCode::InvalidAuthorSignature,
            message: message.into(),
        }
    }

    pub fn expired(message: impl Into<String>) -> Self {
        OrchestrationError::Precondition {
            code: FailureCode::Expired,
            message: message.into(),
        }
    }
}

impl From<arkrelay_store::StoreError> for OrchestrationError {
    fn from(err: arkrelay_store::StoreError) -> Self {
        match err {
            arkrelay_store::StoreError::IllegalTransition { from, to } => {
                OrchestrationError::Internal(format!("illegal transition {from} -> {to}"))
            }
            arkrelay_store::StoreError::InsufficientInventory { .. } => {
                OrchestrationError::insufficient_balance(err.to_string())
            }
            arkrelay_store::StoreError::Conflict(msg) => OrchestrationError::BackendConflict(msg),
            arkrelay_store::StoreError::InvariantViolation(msg) => {
                OrchestrationError::Internal(msg)
            }
            other => OrchestrationError::Internal(other.to_string()),
        }
    }
}

impl From<arkrelay_daemons::DaemonError> for OrchestrationError {
    fn from(err: arkrelay_daemons::DaemonError) -> Self {
        match err {
            arkrelay_daemons::DaemonError::Unavailable { .. }
            | arkrelay_daemons::DaemonError::CircuitOpen { .. }
            | arkrelay_daemons::DaemonError::Timeout { .. } => {
                OrchestrationError::BackendUnavailable(err.to_string())
            }
            arkrelay_daemons::DaemonError::Conflict { .. } => {
                OrchestrationError::BackendConflict(err.to_string())
            }
            arkrelay_daemons::DaemonError::Rejected { .. } => {
                OrchestrationError::Validation(err.to_string())
            }
        }
    }
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
