//! Retry timing for transaction attempts
//!
//! A [`RetryPolicy`] bounds retries by wall-clock time and spaces them out
//! with a [`BackoffStrategy`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use txrun_runner::{BackoffStrategy, RetryPolicy};
//!
//! let policy = RetryPolicy::new(Duration::from_secs(30), BackoffStrategy::new(10, 500))
//!     .with_commit_retry(false);
//!
//! assert_eq!(policy.deadline(), Duration::from_secs(30));
//! assert!(!policy.retries_commit());
//! ```

mod backoff;
mod policy;


pub use backoff::BackoffStrategy;
pub use policy::{DEFAULT_RETRY_DEADLINE, RetryPolicy};
