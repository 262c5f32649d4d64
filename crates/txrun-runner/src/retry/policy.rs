//! Retry policy for transaction attempts

use std::time::Duration;

use tokio::time::Instant;

use super::BackoffStrategy;

/// Default wall-clock budget for retrying a transaction
pub const DEFAULT_RETRY_DEADLINE: Duration = Duration::from_secs(120);

/// Decides how long and how often a failed transaction is retried.
///
/// The attempt count is unbounded; a retry is only scheduled if it would
/// start before `deadline` has elapsed since the first attempt started.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    deadline: Duration,
    backoff: BackoffStrategy,
    retry_commit_on_unknown_result: bool,
}

impl RetryPolicy {
    pub fn new(deadline: Duration, backoff: BackoffStrategy) -> Self {
        Self {
            deadline,
            backoff,
            retry_commit_on_unknown_result: true,
        }
    }

    /// Run each transaction exactly once.
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO, BackoffStrategy::immediate())
            .with_commit_retry(false)
    }

    /// Whether an indeterminate commit is retried as a commit-only step
    /// (default: true). When false it is surfaced to the caller as-is.
    pub fn with_commit_retry(mut self, retry: bool) -> Self {
        self.retry_commit_on_unknown_result = retry;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn backoff(&self) -> &BackoffStrategy {
        &self.backoff
    }

    pub fn retries_commit(&self) -> bool {
        self.retry_commit_on_unknown_result
    }

    /// Whether a retry that waits `delay` first would still start inside the
    /// deadline of a run that began at `started`.
    pub fn allows_retry(&self, started: Instant, delay: Duration) -> bool {
        started.elapsed().saturating_add(delay) < self.deadline
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DEADLINE, BackoffStrategy::default())
    }
}
