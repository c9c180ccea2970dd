//! Error types for waypoint-sweeperd

use thiserror::Error;
use waypoint_storage::StorageError;
use waypoint_types::CollabError;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum SweeperError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Backend that cannot hold anything worth sweeping
    #[error("Storage backend `{0}` is process-local and has nothing to sweep; configure postgres")]
    NonPersistentStorage(&'static str),

    /// Backend could not be opened
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A sweep failed
    #[error("Sweep error: {0}")]
    Sweep(#[from] CollabError),
}

/// Result type alias for daemon operations
pub type SweeperResult<T> = Result<T, SweeperError>;
