//! Error types for txrun

use std::time::Duration;
use thiserror::Error;

/// Retry classification of an error, as signalled by the backing store.
///
/// The runner only looks at this value when deciding what to do after a
/// failed attempt. Anything the store did not explicitly mark as retryable
/// is `Permanent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The whole transaction may succeed if it is run again from the start
    Transient,
    /// The commit may or may not have been applied; only the commit step may be retried
    UnknownCommitResult,
    /// Retrying will not help
    Permanent,
}

impl ErrorClass {
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Core error type for txrun operations
#[derive(Error, Debug)]
pub enum TxrunError {
    #[error("Transient transaction error: {0}")]
    TransientTransaction(String),

    #[error("Write conflict: {0}")]
    WriteConflict(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unknown transaction commit result: {0}")]
    UnknownCommitResult(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Session already has a transaction in progress")]
    TransactionInProgress,

    #[error("No transaction in progress")]
    NoTransaction,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Retry deadline of {deadline:?} exceeded after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        deadline: Duration,
        source: Box<TxrunError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Application(#[from] anyhow::Error),

    #[error("{0}")]
    Other(String),
}

impl TxrunError {
    /// Classify this error for retry purposes.
    ///
    /// Unknown kinds fail closed: only the variants listed here are ever
    /// retried.
    pub fn class(&self) -> ErrorClass {
        match self {
            TxrunError::TransientTransaction(_)
            | TxrunError::WriteConflict(_)
            | TxrunError::Network(_) => ErrorClass::Transient,
            TxrunError::UnknownCommitResult(_) => ErrorClass::UnknownCommitResult,
            _ => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class().is_transient()
    }

    /// The error that ended the last attempt when retries ran out,
    /// or `self` for any other error.
    pub fn last_error(&self) -> &TxrunError {
        match self {
            TxrunError::RetriesExhausted { source, .. } => source,
            other => other,
        }
    }
}

impl From<toml::de::Error> for TxrunError {
    fn from(e: toml::de::Error) -> Self {
        TxrunError::Configuration(e.to_string())
    }
}

/// Result type alias for txrun operations
pub type Result<T> = std::result::Result<T, TxrunError>;
