//! Transaction Runner Tests
//!
//! Runs the retry coordinator against the in-memory store and checks both
//! the returned outcome and what became visible in the store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Result;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use txrun_core::{
    ClientSession, ErrorClass, ReadConcernLevel, SessionSource, TransactionOptions, TxrunError,
    WriteConcern,
};
use txrun_runner::{BackoffStrategy, CancellationToken, RetryPolicy, TransactionRunner};

use crate::fixtures::{CallCounts, MemorySession, MemoryStore, initialize_logging};

const COLLECTION: &str = "restaurants";

fn txn_options() -> TransactionOptions {
    TransactionOptions::new()
        .with_read_concern(ReadConcernLevel::Local)
        .with_write_concern(WriteConcern::majority())
}

fn runner() -> TransactionRunner {
    TransactionRunner::new(RetryPolicy::new(
        Duration::from_secs(120),
        BackoffStrategy::new(5, 1_000).with_jitter(true),
    ))
}

async fn insert_documents(session: &mut MemorySession) -> txrun_core::Result<usize> {
    session
        .insert(COLLECTION, json!({"name": "Sync Pizza", "cuisine": "Pizza"}))
        .await?;
    session
        .insert(COLLECTION, json!({"name": "Sync Burger", "cuisine": "Burger"}))
        .await?;
    Ok(2)
}

fn error_of_kind(kind: &str) -> TxrunError {
    match kind {
        "transient_label" => TxrunError::TransientTransaction("TransientTransactionError".into()),
        "write_conflict" => TxrunError::WriteConflict("WriteConflict".into()),
        "network" => TxrunError::Network("connection reset by peer".into()),
        "validation" => TxrunError::Validation("Document failed validation".into()),
        "duplicate_key" => TxrunError::Driver("E11000 duplicate key error".into()),
        "connection" => TxrunError::Connection("server selection timeout".into()),
        other => TxrunError::Other(other.to_string()),
    }
}

/// First commit fails with a transient label; the second attempt commits
#[tokio::test(start_paused = true)]
async fn test_scenario_transient_commit_then_success() -> Result<()> {
    initialize_logging();
    let store = MemoryStore::new();
    store.fail_commit_with(TxrunError::TransientTransaction(
        "TransientTransactionError on commit".into(),
    ));
    let mut session = store.start_session().await?;

    let report = runner()
        .execute(&mut session, &txn_options(), |s| Box::pin(insert_documents(s)))
        .await?;

    assert_eq!(report.value, 2);
    assert_eq!(report.attempts, 2);
    assert_eq!(
        store.calls(),
        CallCounts {
            starts: 2,
            commit_calls: 2,
            commits: 1,
            aborts: 1,
        }
    );
    assert_eq!(store.count(COLLECTION), 2, "each document is visible exactly once");
    let names: Vec<_> = store
        .documents(COLLECTION)
        .iter()
        .map(|doc| doc["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Sync Pizza"), json!("Sync Burger")]);
    Ok(())
}

/// A permanent error in the unit of work is surfaced unchanged after one abort
#[tokio::test(start_paused = true)]
async fn test_scenario_permanent_error_no_retry() -> Result<()> {
    initialize_logging();
    let store = MemoryStore::new();
    let mut session = store.start_session().await?;
    let body_calls = AtomicU32::new(0);

    let err = runner()
        .run(&mut session, &txn_options(), |s| {
            body_calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                s.insert(COLLECTION, json!({"name": "Invalid"})).await?;
                Err::<(), TxrunError>(TxrunError::Validation("Document failed validation".into()))
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Validation error: Document failed validation");
    assert_eq!(body_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.calls(),
        CallCounts {
            starts: 1,
            commit_calls: 0,
            commits: 0,
            aborts: 1,
        }
    );
    assert_eq!(store.count(COLLECTION), 0);
    Ok(())
}

#[rstest]
#[case::no_failures(0)]
#[case::one_failure(1)]
#[case::several_failures(4)]
#[tokio::test(start_paused = true)]
async fn test_transient_failures_then_success(#[case] failures: u32) -> Result<()> {
    initialize_logging();
    let store = MemoryStore::new();
    for _ in 0..failures {
        store.fail_commit_with(TxrunError::WriteConflict("WriteConflict".into()));
    }
    let mut session = store.start_session().await?;

    let report = runner()
        .execute(&mut session, &txn_options(), |s| Box::pin(insert_documents(s)))
        .await?;

    assert_eq!(report.attempts, failures + 1);
    assert_eq!(store.calls().commits, 1);
    assert_eq!(store.calls().aborts, failures);
    assert_eq!(store.count(COLLECTION), 2);
    Ok(())
}

#[rstest]
#[case::transient_label("transient_label", true)]
#[case::write_conflict("write_conflict", true)]
#[case::network("network", true)]
#[case::validation("validation", false)]
#[case::duplicate_key("duplicate_key", false)]
#[case::connection("connection", false)]
#[tokio::test(start_paused = true)]
async fn test_body_error_retry_decision(#[case] kind: &str, #[case] retried: bool) -> Result<()> {
    initialize_logging();
    let store = MemoryStore::new();
    let mut session = store.start_session().await?;
    let body_calls = AtomicU32::new(0);

    let outcome = runner()
        .run(&mut session, &txn_options(), |s| {
            let first_call = body_calls.fetch_add(1, Ordering::SeqCst) == 0;
            let injected = first_call.then(|| error_of_kind(kind));
            Box::pin(async move {
                if let Some(err) = injected {
                    return Err(err);
                }
                insert_documents(s).await
            })
        })
        .await;

    if retried {
        assert_eq!(outcome?, 2);
        assert_eq!(body_calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.count(COLLECTION), 2);
    } else {
        let err = outcome.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent);
        assert_eq!(err.to_string(), error_of_kind(kind).to_string());
        assert_eq!(body_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.count(COLLECTION), 0);
    }
    assert_eq!(store.calls().aborts, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deadline_surfaces_last_error() -> Result<()> {
    initialize_logging();
    let store = MemoryStore::new();
    for _ in 0..1_000 {
        store.fail_commit_with(TxrunError::TransientTransaction("still conflicting".into()));
    }
    let mut session = store.start_session().await?;
    let runner = TransactionRunner::new(RetryPolicy::new(
        Duration::from_secs(2),
        BackoffStrategy::new(50, 200),
    ));
    let started = tokio::time::Instant::now();

    let err = runner
        .run(&mut session, &txn_options(), |s| Box::pin(insert_documents(s)))
        .await
        .unwrap_err();

    // No attempt is scheduled to start past the deadline
    assert!(started.elapsed() > Duration::from_millis(1_500));
    assert!(started.elapsed() < Duration::from_secs(2));
    match &err {
        TxrunError::RetriesExhausted { attempts, .. } => {
            assert_eq!(*attempts, store.calls().starts);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(
        err.last_error().to_string(),
        "Transient transaction error: still conflicting"
    );
    assert_eq!(store.calls().commits, 0);
    assert_eq!(store.calls().aborts, store.calls().starts);
    assert_eq!(store.count(COLLECTION), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_commit_result_commits_once() -> Result<()> {
    initialize_logging();
    let store = MemoryStore::new();
    store.fail_commit_with(TxrunError::UnknownCommitResult("network timeout".into()));
    let mut session = store.start_session().await?;

    let report = runner()
        .execute(&mut session, &txn_options(), |s| Box::pin(insert_documents(s)))
        .await?;

    assert_eq!(report.attempts, 1);
    assert_eq!(report.commit_attempts, 2);
    assert_eq!(
        store.calls(),
        CallCounts {
            starts: 1,
            commit_calls: 2,
            commits: 1,
            aborts: 0,
        }
    );
    assert_eq!(store.count(COLLECTION), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_abort_failure_does_not_mask_error() -> Result<()> {
    initialize_logging();
    let store = MemoryStore::new();
    store.fail_abort_with(TxrunError::Network("abort lost".into()));
    let mut session = store.start_session().await?;

    let err = runner()
        .run(&mut session, &txn_options(), |s| {
            Box::pin(async move {
                insert_documents(s).await?;
                Err::<(), TxrunError>(anyhow::anyhow!("order total mismatch").into())
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "order total mismatch");
    assert_eq!(store.count(COLLECTION), 0);
    assert!(!session.in_transaction());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_open_transaction() -> Result<()> {
    initialize_logging();
    let store = MemoryStore::new();
    let mut session = store.start_session().await?;
    let token = CancellationToken::new();
    let runner = runner().with_cancellation(token.clone());

    let options = txn_options();
    let run = runner.run(&mut session, &options, |s| {
        Box::pin(async move {
            insert_documents(s).await?;
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), TxrunError>(())
        })
    });
    let cancel = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    };
    let (outcome, ()) = tokio::join!(run, cancel);

    assert!(matches!(outcome, Err(TxrunError::Cancelled)));
    assert_eq!(store.calls().aborts, 1);
    assert_eq!(store.count(COLLECTION), 0);
    Ok(())
}

#[tokio::test]
async fn test_closed_session_rejected() -> Result<()> {
    let store = MemoryStore::new();
    let mut session = store.start_session().await?;
    session.close();

    let err = runner()
        .run(&mut session, &txn_options(), |s| Box::pin(insert_documents(s)))
        .await
        .unwrap_err();

    assert!(matches!(err, TxrunError::SessionClosed));
    assert_eq!(store.calls(), CallCounts::default());
    Ok(())
}

#[tokio::test]
async fn test_session_with_open_transaction_rejected() -> Result<()> {
    let store = MemoryStore::new();
    let mut session = store.start_session().await?;
    session.start_transaction(&txn_options()).await?;
    session.insert(COLLECTION, json!({"name": "Outer"})).await?;

    let err = runner()
        .run(&mut session, &txn_options(), |s| Box::pin(insert_documents(s)))
        .await
        .unwrap_err();

    assert!(matches!(err, TxrunError::TransactionInProgress));
    assert!(session.in_transaction(), "caller's transaction is left alone");
    assert_eq!(store.calls().aborts, 0);

    session.commit_transaction().await?;
    assert_eq!(store.count(COLLECTION), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sequential_transactions_on_one_session() -> Result<()> {
    let store = MemoryStore::new();
    let mut session = store.start_session().await?;
    let runner = runner();

    for _ in 0..3 {
        runner
            .run(&mut session, &txn_options(), |s| Box::pin(insert_documents(s)))
            .await?;
    }

    assert_eq!(store.count(COLLECTION), 6);
    assert_eq!(store.calls().commits, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sessions_do_not_interfere() -> Result<()> {
    let store = MemoryStore::new();
    store.fail_commit_with(TxrunError::WriteConflict("WriteConflict".into()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut session = store.start_session().await?;
                runner()
                    .run(&mut session, &txn_options(), |s| Box::pin(insert_documents(s)))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await??, 2);
    }
    assert_eq!(store.count(COLLECTION), 8);
    assert_eq!(store.calls().commits, 4);
    assert_eq!(store.calls().aborts, 1);
    Ok(())
}
