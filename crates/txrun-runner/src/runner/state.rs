//! Transaction attempt states
//!
//! ```text
//! Idle ──start──▶ InTransaction ──body ok──▶ Committing ──ok──▶ Committed
//!  ▲                    │                      │  ▲
//!  │                 body err               err│  │unknown result
//!  │                    ▼                      ▼  │(commit retry)
//!  └──transient──── Aborting ◀─────────────────┘──┘
//! ```

use std::fmt;

use txrun_core::TxrunError;

/// Observable state of a transaction run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Idle,
    InTransaction,
    Committing,
    Committed,
    Aborting,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Idle => "idle",
            TransactionState::InTransaction => "in_transaction",
            TransactionState::Committing => "committing",
            TransactionState::Committed => "committed",
            TransactionState::Aborting => "aborting",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runner state carrying the data each step needs
pub(crate) enum Phase<T> {
    Idle,
    InTransaction,
    /// The unit of work succeeded; its value is held until commit succeeds
    Committing(T),
    Committed(T),
    /// The attempt failed and must be aborted before the error is handled
    Aborting(TxrunError),
}

impl<T> Phase<T> {
    pub(crate) fn state(&self) -> TransactionState {
        match self {
            Phase::Idle => TransactionState::Idle,
            Phase::InTransaction => TransactionState::InTransaction,
            Phase::Committing(_) => TransactionState::Committing,
            Phase::Committed(_) => TransactionState::Committed,
            Phase::Aborting(_) => TransactionState::Aborting,
        }
    }
}
