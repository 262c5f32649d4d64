//! txrun Core - Core abstractions shared by the transaction runner and drivers
//!
//! This crate provides the fundamental traits and types that all other
//! txrun crates depend on. It defines:
//!
//! - `ClientSession` - Trait for a session that can host one transaction at a time
//! - `SessionSource` - Trait for clients that hand out sessions
//! - `TransactionOptions` - Read concern, write concern and commit time limit
//! - `TxrunError` / `ErrorClass` - The error taxonomy used to decide retries

mod error;
pub mod options;
mod session;

pub use error::*;
pub use options::{Acknowledgment, ReadConcernLevel, TransactionOptions, WriteConcern};
pub use session::*;
