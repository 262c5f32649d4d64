//! Mapping of MongoDB driver errors onto `TxrunError`
//!
//! Retry decisions follow the labels the server and driver attach to
//! errors raised inside a transaction. Codes are only consulted for the
//! cases the labels do not cover.

use mongodb::error::{
    Error as MongoError, ErrorKind, TRANSIENT_TRANSACTION_ERROR,
    UNKNOWN_TRANSACTION_COMMIT_RESULT, WriteFailure,
};
use txrun_core::TxrunError;

/// Server code for a write conflict between concurrent transactions
pub const WRITE_CONFLICT_CODE: i32 = 112;

/// Server code for an operation that exceeded its `maxTimeMS`
pub const MAX_TIME_MS_EXPIRED_CODE: i32 = 50;

/// How the failure reached the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transport {
    /// Socket or pool failure after a server was selected
    Network,
    /// No suitable server could be selected
    ServerSelection,
    Other,
}

/// The parts of a driver error that decide its classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ErrorSignal {
    pub transient_label: bool,
    pub unknown_commit_label: bool,
    pub code: Option<i32>,
    pub transport: Transport,
    pub message: String,
}

impl ErrorSignal {
    pub(crate) fn from_error(err: &MongoError) -> Self {
        let code = match err.kind.as_ref() {
            ErrorKind::Command(command) => Some(command.code),
            ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
            ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => Some(concern.code),
            _ => None,
        };
        let transport = match err.kind.as_ref() {
            ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. } => Transport::Network,
            ErrorKind::ServerSelection { .. } => Transport::ServerSelection,
            _ => Transport::Other,
        };

        Self {
            transient_label: err.contains_label(TRANSIENT_TRANSACTION_ERROR),
            unknown_commit_label: err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT),
            code,
            transport,
            message: err.to_string(),
        }
    }

    pub(crate) fn classify(self) -> TxrunError {
        if self.unknown_commit_label {
            // A commit that ran out of maxTimeMS will not succeed on retry
            if self.code == Some(MAX_TIME_MS_EXPIRED_CODE) {
                return TxrunError::Driver(self.message);
            }
            return TxrunError::UnknownCommitResult(self.message);
        }
        if self.transient_label {
            return TxrunError::TransientTransaction(self.message);
        }
        if self.code == Some(WRITE_CONFLICT_CODE) {
            return TxrunError::WriteConflict(self.message);
        }
        match self.transport {
            Transport::Network => TxrunError::Network(self.message),
            Transport::ServerSelection => TxrunError::Connection(self.message),
            Transport::Other => TxrunError::Driver(self.message),
        }
    }
}

/// Convert a MongoDB driver error into a classified `TxrunError`
pub fn map_mongo_error(err: MongoError) -> TxrunError {
    let signal = ErrorSignal::from_error(&err);
    tracing::trace!(
        code = ?signal.code,
        transient = signal.transient_label,
        unknown_commit = signal.unknown_commit_label,
        "mapping MongoDB error"
    );
    signal.classify()
}
