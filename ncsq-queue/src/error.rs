//! Error types for queue operations.

use crate::store::StoreError;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Caller supplied an argument the queue cannot use (e.g. a non-numeric owner id)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Store failure, passed through unchanged
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker started without a handler
    #[error("No handler registered for queue: {0}")]
    NoHandler(String),

    /// Worker not running
    #[error("Worker not running")]
    WorkerNotRunning,

    /// Worker already running
    #[error("Worker already running")]
    WorkerAlreadyRunning,
}

impl QueueError {
    /// Whether this error came from the store rather than from the caller.
    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<ncsq_redis::RedisError> for QueueError {
    fn from(err: ncsq_redis::RedisError) -> Self {
        Self::Store(StoreError::Redis(err))
    }
}
