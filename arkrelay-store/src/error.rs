use thiserror::Error;

/// Errors surfaced by [`crate::Store`]. Callers (the orchestration engine in
/// `arkrelay-core`) map these onto the typed error taxonomy of spec §7.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no row found for {0}")]
    NotFound(&'static str),

    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: i64, available: i64 },

    #[error("conflict: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
