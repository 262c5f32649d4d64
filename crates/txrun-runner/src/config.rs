//! Runner configuration loaded from TOML
//!
//! ```toml
//! deadline_ms = 60000
//! retry_commit_on_unknown_result = true
//!
//! [backoff]
//! initial_ms = 10
//! max_ms = 2000
//! multiplier = 2.0
//! jitter = true
//!
//! [transaction]
//! read_concern = "local"
//! write_concern = { w = "majority" }
//! ```
//!
//! Every field is optional; missing fields take the defaults of
//! [`RetryPolicy::default`] and [`TransactionOptions::new`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use txrun_core::{Result, TransactionOptions, TxrunError};

use crate::{BackoffStrategy, DEFAULT_RETRY_DEADLINE, RetryPolicy};

/// Backoff settings as they appear in a configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let backoff = BackoffStrategy::default();
        Self {
            initial_ms: backoff.initial_delay().as_millis() as u64,
            max_ms: backoff.max_delay().as_millis() as u64,
            multiplier: backoff.multiplier(),
            jitter: backoff.has_jitter(),
        }
    }
}

impl From<&BackoffConfig> for BackoffStrategy {
    fn from(config: &BackoffConfig) -> Self {
        BackoffStrategy::new(config.initial_ms, config.max_ms)
            .with_multiplier(config.multiplier)
            .with_jitter(config.jitter)
    }
}

/// Runner configuration: retry timing plus the default transaction options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Wall-clock retry budget in milliseconds
    pub deadline_ms: u64,
    pub retry_commit_on_unknown_result: bool,
    pub backoff: BackoffConfig,
    pub transaction: TransactionOptions,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_RETRY_DEADLINE.as_millis() as u64,
            retry_commit_on_unknown_result: true,
            backoff: BackoffConfig::default(),
            transaction: TransactionOptions::new(),
        }
    }
}

impl RunnerConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RunnerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading runner configuration");
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.backoff.multiplier.is_finite() {
            return Err(TxrunError::Configuration(
                "backoff multiplier must be a finite number".to_string(),
            ));
        }
        self.transaction.validate()
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.deadline(), BackoffStrategy::from(&self.backoff))
            .with_commit_retry(self.retry_commit_on_unknown_result)
    }
}
