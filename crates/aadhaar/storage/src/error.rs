use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("identity {0} already registered")]
    DuplicateIdentity(String),

    #[error("access token already issued")]
    DuplicateToken,

    #[error("stale chain head: expected sequence {expected}, found {found}")]
    StaleHead { expected: u64, found: u64 },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend could not be reached or aborted the operation; retrying may succeed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}
