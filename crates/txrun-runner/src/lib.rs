//! Retrying transaction runner
//!
//! Wraps a unit of work in a session transaction and re-runs it when the
//! server reports a transient failure, bounded by a wall-clock deadline.

mod config;
mod retry;
mod runner;

pub use config::{BackoffConfig, RunnerConfig};
pub use retry::{BackoffStrategy, DEFAULT_RETRY_DEADLINE, RetryPolicy};
pub use runner::{TransactionReport, TransactionRunner, TransactionState};
pub use tokio_util::sync::CancellationToken;
