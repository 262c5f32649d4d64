//! Transaction options
//!
//! `TransactionOptions` is an immutable value handed to the runner by the
//! caller. It can be built in code or deserialized from a configuration file.
//!
//! ```
//! use std::time::Duration;
//! use txrun_core::{ReadConcernLevel, TransactionOptions, WriteConcern};
//!
//! let options = TransactionOptions::new()
//!     .with_read_concern(ReadConcernLevel::Local)
//!     .with_write_concern(WriteConcern::majority())
//!     .with_max_commit_time(Duration::from_secs(5));
//!
//! assert_eq!(options.read_concern(), Some(ReadConcernLevel::Local));
//! assert!(options.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, TxrunError};

/// Read concern level applied to reads inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadConcernLevel {
    #[default]
    Local,
    Available,
    Majority,
    Linearizable,
    Snapshot,
}

impl ReadConcernLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadConcernLevel::Local => "local",
            ReadConcernLevel::Available => "available",
            ReadConcernLevel::Majority => "majority",
            ReadConcernLevel::Linearizable => "linearizable",
            ReadConcernLevel::Snapshot => "snapshot",
        }
    }
}

/// How many members must acknowledge a write
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "AcknowledgmentRepr", into = "AcknowledgmentRepr")]
pub enum Acknowledgment {
    /// A majority of voting members
    Majority,
    /// A fixed number of members
    Nodes(u32),
    /// A custom tag set defined on the replica set
    Tag(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AcknowledgmentRepr {
    Nodes(u32),
    Tag(String),
}

impl From<AcknowledgmentRepr> for Acknowledgment {
    fn from(repr: AcknowledgmentRepr) -> Self {
        match repr {
            AcknowledgmentRepr::Nodes(n) => Acknowledgment::Nodes(n),
            AcknowledgmentRepr::Tag(tag) if tag.eq_ignore_ascii_case("majority") => {
                Acknowledgment::Majority
            }
            AcknowledgmentRepr::Tag(tag) => Acknowledgment::Tag(tag),
        }
    }
}

impl From<Acknowledgment> for AcknowledgmentRepr {
    fn from(ack: Acknowledgment) -> Self {
        match ack {
            Acknowledgment::Majority => AcknowledgmentRepr::Tag("majority".to_string()),
            Acknowledgment::Nodes(n) => AcknowledgmentRepr::Nodes(n),
            Acknowledgment::Tag(tag) => AcknowledgmentRepr::Tag(tag),
        }
    }
}

/// Write concern applied when the transaction commits
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConcern {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<Acknowledgment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WriteConcern {
    /// Acknowledged by a majority of voting members
    pub fn majority() -> Self {
        Self {
            w: Some(Acknowledgment::Majority),
            ..Self::default()
        }
    }

    /// Acknowledged by `n` members
    pub fn nodes(n: u32) -> Self {
        Self {
            w: Some(Acknowledgment::Nodes(n)),
            ..Self::default()
        }
    }

    pub fn with_journal(mut self, journal: bool) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Transactions need acknowledged writes, so `w: 0` is rejected.
    fn validate(&self) -> Result<()> {
        if self.w == Some(Acknowledgment::Nodes(0)) {
            return Err(TxrunError::Validation(
                "transactions require an acknowledged write concern (w > 0)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Options applied to every attempt of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    read_concern: Option<ReadConcernLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    write_concern: Option<WriteConcern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_commit_time_ms: Option<u64>,
}

impl TransactionOptions {
    /// Options that defer everything to the session and client defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_concern(mut self, level: ReadConcernLevel) -> Self {
        self.read_concern = Some(level);
        self
    }

    pub fn with_write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = Some(write_concern);
        self
    }

    /// Limit how long the server may spend on a single commit
    pub fn with_max_commit_time(mut self, max_commit_time: Duration) -> Self {
        self.max_commit_time_ms = Some(max_commit_time.as_millis() as u64);
        self
    }

    pub fn read_concern(&self) -> Option<ReadConcernLevel> {
        self.read_concern
    }

    pub fn write_concern(&self) -> Option<&WriteConcern> {
        self.write_concern.as_ref()
    }

    pub fn max_commit_time(&self) -> Option<Duration> {
        self.max_commit_time_ms.map(Duration::from_millis)
    }

    /// Check the options before any transaction is started with them.
    pub fn validate(&self) -> Result<()> {
        if self.max_commit_time_ms == Some(0) {
            return Err(TxrunError::Validation(
                "max commit time must be greater than zero".to_string(),
            ));
        }
        if let Some(write_concern) = &self.write_concern {
            write_concern.validate()?;
        }
        Ok(())
    }
}
