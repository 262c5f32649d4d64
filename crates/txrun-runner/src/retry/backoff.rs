//! Exponential backoff between transaction attempts
//!
//! Delays grow exponentially with each retry, up to a cap. Jitter spreads
//! out retries from sessions that failed on the same conflict so they do not
//! collide again on the next attempt.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff strategy for transaction retries.
///
/// # Example
///
/// ```
/// use txrun_runner::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(5, 1_000);
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(5));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(10));
/// assert!(backoff.calculate_delay(30) <= Duration::from_millis(1_000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStrategy {
    /// Delay before the first retry, in milliseconds
    initial_ms: u64,
    /// Cap for exponential growth, in milliseconds
    max_ms: u64,
    /// Growth factor per retry
    multiplier: f64,
    /// Randomize each delay by up to ±25%, never exceeding `max_ms`
    jitter: bool,
}

impl BackoffStrategy {
    /// Create a backoff strategy with the given initial and maximum delays.
    ///
    /// Jitter is off; enable it with [`BackoffStrategy::with_jitter`].
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms,
            max_ms: max_ms.max(initial_ms),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Retry immediately, without waiting between attempts.
    pub fn immediate() -> Self {
        Self::new(0, 0)
    }

    /// Set the growth factor. Values below 1.0 are clamped to 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait before retry number `retry` (0 = first retry).
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let exponent = retry.min(i32::MAX as u32) as i32;
        let delay_ms = (self.initial_ms as f64) * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_ms as f64) as u64;

        if !self.jitter || capped_ms == 0 {
            return Duration::from_millis(capped_ms);
        }

        let spread = capped_ms / 4;
        let low = capped_ms.saturating_sub(spread);
        let high = capped_ms.saturating_add(spread).min(self.max_ms);
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn has_jitter(&self) -> bool {
        self.jitter
    }
}

impl Default for BackoffStrategy {
    /// 5ms initial, 1 second cap, 2x growth, jittered
    fn default() -> Self {
        Self::new(5, 1_000).with_jitter(true)
    }
}
