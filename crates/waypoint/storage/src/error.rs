use thiserror::Error;
use waypoint_types::CollabError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A write whose actor no longer satisfies the precondition the store checks
    #[error("not permitted: {0}")]
    NotPermitted(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Fallback mapping. Callers that know which record a storage error refers
/// to should map it to the specific domain error instead.
impl From<StorageError> for CollabError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) => CollabError::StaleWrite(msg),
            StorageError::InvalidInput(msg) => CollabError::Validation(msg),
            StorageError::NotPermitted(msg) => CollabError::PermissionDenied(msg),
            other => CollabError::Storage(other.to_string()),
        }
    }
}
