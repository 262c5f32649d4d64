//! Transaction runner
//!
//! [`TransactionRunner`] drives a unit of work through start, body and
//! commit on a [`ClientSession`](txrun_core::ClientSession), aborting failed
//! attempts and retrying those that fail with a transient error.

mod state;
mod transaction_runner;


pub use state::TransactionState;
pub use transaction_runner::{TransactionReport, TransactionRunner};
