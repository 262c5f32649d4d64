//! Test fixtures: an in-memory backing store and live-server helpers.
//!
//! [`MemoryStore`] keeps committed documents per collection and hands out
//! [`MemorySession`]s. A session buffers its writes while a transaction is
//! open, publishes them on commit and drops them on abort, so tests can check
//! exactly what became visible. Every `start`, `commit` and `abort` call is
//! counted, and failures can be scripted ahead of time.
//!
//! # Usage
//!
//! ```rust,ignore
//! use txrun_driver_tests::fixtures::MemoryStore;
//! use txrun_core::{SessionSource, TxrunError};
//!
//! let store = MemoryStore::new();
//! store.fail_commit_with(TxrunError::TransientTransaction("conflict".into()));
//!
//! let mut session = store.start_session().await?;
//! // run a transaction...
//! assert_eq!(store.calls().aborts, 1);
//! ```
//!
//! Tests against a real deployment read `TXRUN_TEST_MONGODB_URI`; they are
//! skipped when it is unset. Transactions need a replica set or sharded
//! cluster.

use std::collections::{HashMap, VecDeque};
use std::env;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;
use txrun_core::{ClientSession, Result, SessionSource, TransactionOptions, TxrunError};

/// Environment variable naming a MongoDB deployment for live tests
pub const MONGODB_URI_ENV: &str = "TXRUN_TEST_MONGODB_URI";

static MONGODB_URI: Lazy<Option<String>> =
    Lazy::new(|| env::var(MONGODB_URI_ENV).ok().filter(|uri| !uri.is_empty()));

/// Connection string for live tests, if one is configured
pub fn mongodb_uri() -> Option<&'static str> {
    MONGODB_URI.as_deref()
}

/// How many times each session operation reached the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Transactions started, including failed starts
    pub starts: u32,
    /// Commit calls, including failed ones
    pub commit_calls: u32,
    /// Commits that published their writes
    pub commits: u32,
    /// Abort calls, including ones that reported an error
    pub aborts: u32,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, Vec<Value>>,
    calls: CallCounts,
    start_failures: VecDeque<TxrunError>,
    commit_failures: VecDeque<TxrunError>,
    abort_failures: VecDeque<TxrunError>,
}

/// Shared in-memory document store
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `start_transaction` fail with `err`
    pub fn fail_start_with(&self, err: TxrunError) {
        self.lock().start_failures.push_back(err);
    }

    /// Make the next `commit_transaction` fail with `err`.
    ///
    /// The transaction stays open so the commit can be retried or aborted.
    pub fn fail_commit_with(&self, err: TxrunError) {
        self.lock().commit_failures.push_back(err);
    }

    /// Make the next `abort_transaction` report `err` after discarding writes
    pub fn fail_abort_with(&self, err: TxrunError) {
        self.lock().abort_failures.push_back(err);
    }

    /// Counts of session calls so far
    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Committed documents in `collection`
    pub fn documents(&self, collection: &str) -> Vec<Value> {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of committed documents in `collection`
    pub fn count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Open a session synchronously
    pub fn session(&self) -> MemorySession {
        MemorySession {
            store: self.clone(),
            pending: None,
            closed: false,
        }
    }
}

#[async_trait]
impl SessionSource for MemoryStore {
    type Session = MemorySession;

    async fn start_session(&self) -> Result<MemorySession> {
        Ok(self.session())
    }
}

/// Session over a [`MemoryStore`]
pub struct MemorySession {
    store: MemoryStore,
    /// Writes of the open transaction, in order
    pending: Option<Vec<(String, Value)>>,
    closed: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TxrunError::SessionClosed);
        }
        Ok(())
    }

    /// Insert a document. Inside a transaction the write is buffered until
    /// commit; outside one it is applied immediately.
    pub async fn insert(&mut self, collection: &str, document: Value) -> Result<()> {
        self.ensure_open()?;
        match self.pending.as_mut() {
            Some(pending) => pending.push((collection.to_string(), document)),
            None => self
                .store
                .lock()
                .collections
                .entry(collection.to_string())
                .or_default()
                .push(document),
        }
        Ok(())
    }

    /// Documents visible to this session: committed ones plus its own
    /// uncommitted writes
    pub async fn find(&mut self, collection: &str) -> Result<Vec<Value>> {
        self.ensure_open()?;
        let mut documents = self.store.documents(collection);
        if let Some(pending) = &self.pending {
            documents.extend(
                pending
                    .iter()
                    .filter(|(name, _)| name == collection)
                    .map(|(_, doc)| doc.clone()),
            );
        }
        Ok(documents)
    }

    /// End the session, discarding any open transaction
    pub fn close(&mut self) {
        self.pending = None;
        self.closed = true;
    }
}

#[async_trait]
impl ClientSession for MemorySession {
    fn driver_name(&self) -> &str {
        "memory"
    }

    fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn start_transaction(&mut self, options: &TransactionOptions) -> Result<()> {
        self.ensure_open()?;
        if self.pending.is_some() {
            return Err(TxrunError::TransactionInProgress);
        }
        options.validate()?;

        let mut state = self.store.lock();
        state.calls.starts += 1;
        if let Some(err) = state.start_failures.pop_front() {
            return Err(err);
        }
        drop(state);

        self.pending = Some(Vec::new());
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.pending.is_none() {
            return Err(TxrunError::NoTransaction);
        }

        let mut state = self.store.lock();
        state.calls.commit_calls += 1;
        if let Some(err) = state.commit_failures.pop_front() {
            return Err(err);
        }

        for (collection, document) in self.pending.take().unwrap_or_default() {
            state.collections.entry(collection).or_default().push(document);
        }
        state.calls.commits += 1;
        Ok(())
    }

    async fn abort_transaction(&mut self) -> Result<()> {
        self.pending = None;
        let mut state = self.store.lock();
        state.calls.aborts += 1;
        match state.abort_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Initialize logging for tests if not already initialized
pub fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("txrun_runner=debug,txrun_driver_tests=debug"));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_writes_hidden_until_commit() {
        let store = MemoryStore::new();
        let mut writer = store.start_session().await.unwrap();
        let mut reader = store.start_session().await.unwrap();

        writer
            .start_transaction(&TransactionOptions::new())
            .await
            .unwrap();
        writer.insert("restaurants", json!({"name": "A"})).await.unwrap();

        assert_eq!(writer.find("restaurants").await.unwrap().len(), 1);
        assert!(reader.find("restaurants").await.unwrap().is_empty());

        writer.commit_transaction().await.unwrap();
        assert_eq!(reader.find("restaurants").await.unwrap(), vec![json!({"name": "A"})]);
    }

    #[tokio::test]
    async fn test_abort_discards_writes() {
        let store = MemoryStore::new();
        let mut session = store.session();

        session
            .start_transaction(&TransactionOptions::new())
            .await
            .unwrap();
        session.insert("restaurants", json!({"name": "A"})).await.unwrap();
        session.abort_transaction().await.unwrap();

        assert_eq!(store.count("restaurants"), 0);
        assert!(!session.in_transaction());
        assert_eq!(
            store.calls(),
            CallCounts {
                starts: 1,
                aborts: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_scripted_commit_failure_keeps_transaction_open() {
        let store = MemoryStore::new();
        store.fail_commit_with(TxrunError::UnknownCommitResult("timeout".into()));
        let mut session = store.session();

        session
            .start_transaction(&TransactionOptions::new())
            .await
            .unwrap();
        session.insert("restaurants", json!({"name": "A"})).await.unwrap();

        assert!(session.commit_transaction().await.is_err());
        assert!(session.in_transaction());
        session.commit_transaction().await.unwrap();

        assert_eq!(store.count("restaurants"), 1);
        assert_eq!(store.calls().commit_calls, 2);
        assert_eq!(store.calls().commits, 1);
    }

    #[tokio::test]
    async fn test_nested_start_rejected() {
        let store = MemoryStore::new();
        let mut session = store.session();
        let options = TransactionOptions::new();

        session.start_transaction(&options).await.unwrap();
        let err = session.start_transaction(&options).await.unwrap_err();
        assert!(matches!(err, TxrunError::TransactionInProgress));
        assert_eq!(store.calls().starts, 1);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_operations() {
        let store = MemoryStore::new();
        let mut session = store.session();
        session.close();

        assert!(session.is_closed());
        let err = session.insert("restaurants", json!({})).await.unwrap_err();
        assert!(matches!(err, TxrunError::SessionClosed));
    }

    #[tokio::test]
    async fn test_insert_outside_transaction_applies_immediately() {
        let store = MemoryStore::new();
        let mut session = store.session();
        session.insert("restaurants", json!({"name": "A"})).await.unwrap();
        assert_eq!(store.count("restaurants"), 1);
    }
}
