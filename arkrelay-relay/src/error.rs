use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("no relay connection is healthy")]
    AllRelaysDown,

    #[error("failed to connect to relay {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("invalid envelope signature from {author}")]
    InvalidSignature { author: String },

    #[error("failed to decrypt direct message: {0}")]
    DecryptionFailed(String),

    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),
}

pub type RelayResult<T> = Result<T, RelayError>;
