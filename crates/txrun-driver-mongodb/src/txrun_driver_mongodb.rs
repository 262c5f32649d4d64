//! MongoDB binding for the txrun transaction runner
//!
//! Provides a [`MongoClient`] that hands out [`MongoSession`]s. A session
//! implements [`txrun_core::ClientSession`], so it can be driven by
//! `txrun_runner::TransactionRunner`, and exposes the read/write helpers a
//! unit of work uses inside the transaction.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use txrun_core::{ReadConcernLevel, TransactionOptions, WriteConcern};
//! use txrun_driver_mongodb::{ConnectionSettings, MongoClient, MongoSession};
//! use txrun_runner::TransactionRunner;
//!
//! async fn insert_documents(session: &mut MongoSession) -> txrun_core::Result<()> {
//!     session.insert_one("restaurants", doc! { "name": "Rust Pizza", "cuisine": "Pizza" }).await?;
//!     Ok(())
//! }
//!
//! let settings = ConnectionSettings::from_uri(uri, "sample_restaurants");
//! let client = MongoClient::connect(&settings).await?;
//! let mut session = client.start_session().await?;
//!
//! let options = TransactionOptions::new()
//!     .with_read_concern(ReadConcernLevel::Local)
//!     .with_write_concern(WriteConcern::majority());
//!
//! TransactionRunner::default()
//!     .run(&mut session, &options, |s| Box::pin(insert_documents(s)))
//!     .await?;
//! ```

mod driver;
#[cfg(test)]
mod driver_tests;
mod error;
mod options;
mod session;

pub use driver::*;
pub use error::{MAX_TIME_MS_EXPIRED_CODE, WRITE_CONFLICT_CODE, map_mongo_error};
pub use session::MongoSession;
