//! Error types for leasepool

use std::time::Duration;

use thiserror::Error;

/// Stage of a transaction at which a terminal failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStage {
    Begin,
    Commit,
}

impl std::fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStage::Begin => write!(f, "begin"),
            TransactionStage::Commit => write!(f, "commit"),
        }
    }
}

/// Core error type for pool, transaction and collaborator operations
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    #[error("Pool already exists: {0}")]
    PoolAlreadyExists(String),

    #[error("Pool exhausted: {pool} (no connection within {timeout:?})")]
    PoolExhausted { pool: String, timeout: Duration },

    #[error("Pool closed: {0}")]
    PoolClosed(String),

    #[error("Unknown lease {lease} for pool {pool}")]
    UnknownLease { pool: String, lease: uuid::Uuid },

    #[error("Arity mismatch: work accepts {expected} parameters, called with {got}")]
    Arity { expected: usize, got: usize },

    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("Transaction failed at {stage}: {message}")]
    TransactionFailed {
        stage: TransactionStage,
        message: String,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl PoolError {
    /// Whether this error should make a transaction runner roll back and retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::TransactionConflict(_))
    }
}

/// Result type alias for leasepool operations
pub type Result<T> = std::result::Result<T, PoolError>;
