//! Session traits implemented by database drivers

use async_trait::async_trait;

use crate::{Result, TransactionOptions};

/// A client session that can host one transaction at a time.
///
/// Implementations delegate to the backing store. Writes issued through the
/// session while a transaction is open are attributed to that transaction and
/// only become visible to other sessions after `commit_transaction` succeeds.
#[async_trait]
pub trait ClientSession: Send {
    /// Get the driver name (e.g., "mongodb", "memory")
    fn driver_name(&self) -> &str;

    /// Whether a transaction is currently open on this session
    fn in_transaction(&self) -> bool;

    /// Whether the session has been ended and can no longer be used
    fn is_closed(&self) -> bool;

    /// Start a transaction with the given options
    ///
    /// Fails with `TransactionInProgress` if a transaction is already open.
    async fn start_transaction(&mut self, options: &TransactionOptions) -> Result<()>;

    /// Commit the open transaction
    async fn commit_transaction(&mut self) -> Result<()>;

    /// Abort the open transaction, discarding its writes
    async fn abort_transaction(&mut self) -> Result<()>;
}

#[async_trait]
impl<S: ClientSession + ?Sized> ClientSession for Box<S> {
    fn driver_name(&self) -> &str {
        (**self).driver_name()
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    async fn start_transaction(&mut self, options: &TransactionOptions) -> Result<()> {
        (**self).start_transaction(options).await
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        (**self).commit_transaction().await
    }

    async fn abort_transaction(&mut self) -> Result<()> {
        (**self).abort_transaction().await
    }
}

/// A client that hands out sessions
///
/// The caller owns each session it acquires and releases it by dropping it.
#[async_trait]
pub trait SessionSource: Send + Sync {
    type Session: ClientSession;

    /// Start a new session
    async fn start_session(&self) -> Result<Self::Session>;
}
