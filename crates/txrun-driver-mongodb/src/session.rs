//! `ClientSession` implementation over a MongoDB driver session

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::Collection;
use txrun_core::{ClientSession, Result, TransactionOptions, TxrunError};

use crate::error::map_mongo_error;
use crate::options::transaction_options;

/// Local view of the driver session's transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalState {
    Idle,
    Active,
    /// A commit was sent and failed. The commit may be retried, but the
    /// server no longer accepts an abort for this transaction, so abort only
    /// clears local state.
    CommitFailed,
}

/// A MongoDB client session bound to one database
///
/// Every read and write helper passes the underlying driver session to the
/// server, so operations issued while a transaction is open belong to it.
pub struct MongoSession {
    inner: mongodb::ClientSession,
    database: String,
    state: LocalState,
    closed: bool,
}

impl MongoSession {
    pub(crate) fn new(inner: mongodb::ClientSession, database: String) -> Self {
        Self {
            inner,
            database,
            state: LocalState::Idle,
            closed: false,
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// The underlying driver session, for operations not wrapped here
    pub fn inner_mut(&mut self) -> &mut mongodb::ClientSession {
        &mut self.inner
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.inner
            .client()
            .database(&self.database)
            .collection(name)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TxrunError::SessionClosed);
        }
        Ok(())
    }

    pub async fn insert_one(&mut self, collection: &str, document: Document) -> Result<Bson> {
        self.ensure_open()?;
        let result = self
            .collection(collection)
            .insert_one(document)
            .session(&mut self.inner)
            .await
            .map_err(map_mongo_error)?;
        tracing::trace!(collection, "inserted one document");
        Ok(result.inserted_id)
    }

    /// Insert documents in order, returning how many were inserted
    pub async fn insert_many(
        &mut self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize> {
        self.ensure_open()?;
        if documents.is_empty() {
            return Ok(0);
        }
        let result = self
            .collection(collection)
            .insert_many(documents)
            .session(&mut self.inner)
            .await
            .map_err(map_mongo_error)?;
        tracing::trace!(collection, count = result.inserted_ids.len(), "inserted documents");
        Ok(result.inserted_ids.len())
    }

    /// Update the first matching document, returning the modified count
    pub async fn update_one(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        self.ensure_open()?;
        let result = self
            .collection(collection)
            .update_one(filter, update)
            .session(&mut self.inner)
            .await
            .map_err(map_mongo_error)?;
        Ok(result.modified_count)
    }

    pub async fn delete_many(&mut self, collection: &str, filter: Document) -> Result<u64> {
        self.ensure_open()?;
        let result = self
            .collection(collection)
            .delete_many(filter)
            .session(&mut self.inner)
            .await
            .map_err(map_mongo_error)?;
        Ok(result.deleted_count)
    }

    /// Collect every document matching `filter`
    pub async fn find(&mut self, collection: &str, filter: Document) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let mut cursor = self
            .collection(collection)
            .find(filter)
            .session(&mut self.inner)
            .await
            .map_err(map_mongo_error)?;
        cursor
            .stream(&mut self.inner)
            .try_collect()
            .await
            .map_err(map_mongo_error)
    }

    pub async fn count_documents(&mut self, collection: &str, filter: Document) -> Result<u64> {
        self.ensure_open()?;
        self.collection(collection)
            .count_documents(filter)
            .session(&mut self.inner)
            .await
            .map_err(map_mongo_error)
    }

    /// Abort any open transaction and refuse further use.
    ///
    /// The server-side session is released when the value is dropped.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let aborted = self.abort_transaction().await;
        self.closed = true;
        tracing::debug!(database = %self.database, "MongoDB session closed");
        aborted
    }
}

#[async_trait]
impl ClientSession for MongoSession {
    fn driver_name(&self) -> &str {
        "mongodb"
    }

    fn in_transaction(&self) -> bool {
        self.state != LocalState::Idle
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn start_transaction(&mut self, options: &TransactionOptions) -> Result<()> {
        self.ensure_open()?;
        if self.state != LocalState::Idle {
            return Err(TxrunError::TransactionInProgress);
        }
        self.inner
            .start_transaction()
            .with_options(transaction_options(options))
            .await
            .map_err(map_mongo_error)?;
        self.state = LocalState::Active;
        tracing::trace!(database = %self.database, "transaction started");
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.state == LocalState::Idle {
            return Err(TxrunError::NoTransaction);
        }
        match self.inner.commit_transaction().await {
            Ok(()) => {
                self.state = LocalState::Idle;
                tracing::trace!(database = %self.database, "transaction committed");
                Ok(())
            }
            Err(e) => {
                // Retrying the commit stays allowed; abort becomes local
                self.state = LocalState::CommitFailed;
                Err(map_mongo_error(e))
            }
        }
    }

    async fn abort_transaction(&mut self) -> Result<()> {
        match self.state {
            LocalState::Idle => Ok(()),
            LocalState::CommitFailed => {
                tracing::trace!(database = %self.database, "discarding failed commit locally");
                self.state = LocalState::Idle;
                Ok(())
            }
            LocalState::Active => {
                self.state = LocalState::Idle;
                let aborted = self.inner.abort_transaction().await;
                aborted.map_err(map_mongo_error)
            }
        }
    }
}
