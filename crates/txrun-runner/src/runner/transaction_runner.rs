//! Retrying transaction runner

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use txrun_core::{ClientSession, ErrorClass, Result, TransactionOptions, TxrunError};

use super::state::Phase;
use crate::{RetryPolicy, RunnerConfig};

/// Result of a committed transaction together with how it got there
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReport<T> {
    /// Value returned by the unit of work on the attempt that committed
    pub value: T,
    /// Number of transactions started, including the one that committed
    pub attempts: u32,
    /// Number of commit calls across all attempts
    pub commit_attempts: u32,
    pub elapsed: Duration,
}

impl<T> TransactionReport<T> {
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Runs a unit of work inside a session transaction, retrying on transient
/// errors until the policy's deadline.
///
/// The unit of work receives the session explicitly and may be invoked more
/// than once, so it must be safe to re-run from the beginning. Every failed
/// attempt is aborted before the next one starts or the error is returned.
///
/// # Example
///
/// ```ignore
/// let runner = TransactionRunner::default();
/// let options = TransactionOptions::new().with_write_concern(WriteConcern::majority());
///
/// let inserted = runner
///     .run(&mut session, &options, |session| {
///         Box::pin(insert_documents(session, docs.clone()))
///     })
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransactionRunner {
    policy: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl TransactionRunner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: None,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.retry_policy())
    }

    /// Abort the open transaction and return `Cancelled` once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `work` in a transaction and return its value once committed.
    pub async fn run<S, T, F>(
        &self,
        session: &mut S,
        options: &TransactionOptions,
        work: F,
    ) -> Result<T>
    where
        S: ClientSession + ?Sized,
        F: for<'s> FnMut(&'s mut S) -> BoxFuture<'s, Result<T>>,
    {
        self.execute(session, options, work)
            .await
            .map(TransactionReport::into_value)
    }

    /// Like [`TransactionRunner::run`], but also reports attempt counts.
    #[tracing::instrument(level = "debug", skip_all, fields(driver = %session.driver_name()))]
    pub async fn execute<S, T, F>(
        &self,
        session: &mut S,
        options: &TransactionOptions,
        mut work: F,
    ) -> Result<TransactionReport<T>>
    where
        S: ClientSession + ?Sized,
        F: for<'s> FnMut(&'s mut S) -> BoxFuture<'s, Result<T>>,
    {
        options.validate()?;
        if session.is_closed() {
            return Err(TxrunError::SessionClosed);
        }
        if session.in_transaction() {
            return Err(TxrunError::TransactionInProgress);
        }

        let started = Instant::now();
        let mut attempts = 0u32;
        let mut commit_attempts = 0u32;
        let mut commit_retries = 0u32;
        let mut phase: Phase<T> = Phase::Idle;

        loop {
            tracing::trace!(state = %phase.state(), attempts, "transaction step");
            phase = match phase {
                Phase::Idle => {
                    attempts += 1;
                    commit_retries = 0;
                    tracing::debug!(attempt = attempts, "starting transaction");
                    let started_txn = self.guard(session.start_transaction(options)).await;
                    match started_txn {
                        Ok(()) => Phase::InTransaction,
                        Err(err) if session.in_transaction() => Phase::Aborting(err),
                        Err(err) => {
                            self.prepare_retry(err, started, attempts).await?;
                            Phase::Idle
                        }
                    }
                }
                Phase::InTransaction => {
                    let outcome = self.guard(work(session)).await;
                    match outcome {
                        Ok(value) => Phase::Committing(value),
                        Err(err) => Phase::Aborting(err),
                    }
                }
                Phase::Committing(value) => {
                    commit_attempts += 1;
                    let committed = self.guard(session.commit_transaction()).await;
                    match committed {
                        Ok(()) => Phase::Committed(value),
                        Err(err) => match self.commit_retry_delay(&err, started, commit_retries) {
                            Some(delay) => {
                                commit_retries += 1;
                                tracing::warn!(
                                    commit_attempt = commit_attempts,
                                    error = %err,
                                    delay_ms = delay.as_millis() as u64,
                                    "commit result unknown, retrying commit"
                                );
                                match self.pause(delay).await {
                                    Ok(()) => Phase::Committing(value),
                                    Err(cancelled) => Phase::Aborting(cancelled),
                                }
                            }
                            None => Phase::Aborting(err),
                        },
                    }
                }
                Phase::Committed(value) => {
                    let elapsed = started.elapsed();
                    tracing::debug!(
                        attempts,
                        commit_attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "transaction committed"
                    );
                    return Ok(TransactionReport {
                        value,
                        attempts,
                        commit_attempts,
                        elapsed,
                    });
                }
                Phase::Aborting(err) => {
                    abort(session, &err).await;
                    // A session still holding the transaction cannot start another one
                    if session.in_transaction() {
                        tracing::warn!(
                            attempts,
                            error = %err,
                            "transaction still open after abort, not retrying"
                        );
                        return Err(err);
                    }
                    self.prepare_retry(err, started, attempts).await?;
                    Phase::Idle
                }
            };
        }
    }

    /// Backoff before re-sending a commit whose outcome is unknown, or `None`
    /// when the attempt has to be aborted instead.
    fn commit_retry_delay(&self, err: &TxrunError, started: Instant, retry: u32) -> Option<Duration> {
        if err.class() != ErrorClass::UnknownCommitResult || !self.policy.retries_commit() {
            return None;
        }
        let delay = self.policy.backoff().calculate_delay(retry);
        self.policy.allows_retry(started, delay).then_some(delay)
    }

    /// Return the error unless it is transient and the next attempt would
    /// still start before the deadline, in which case wait out the backoff.
    async fn prepare_retry(&self, err: TxrunError, started: Instant, attempts: u32) -> Result<()> {
        if !err.is_transient() {
            tracing::debug!(attempts, error = %err, "transaction failed");
            return Err(err);
        }
        let delay = self
            .policy
            .backoff()
            .calculate_delay(attempts.saturating_sub(1));
        if !self.policy.allows_retry(started, delay) {
            tracing::warn!(
                attempts,
                error = %err,
                deadline_ms = self.policy.deadline().as_millis() as u64,
                "transaction retry deadline exceeded"
            );
            return Err(TxrunError::RetriesExhausted {
                attempts,
                deadline: self.policy.deadline(),
                source: Box::new(err),
            });
        }

        tracing::info!(
            attempt = attempts,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "transient transaction error, retrying"
        );
        self.pause(delay).await
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        self.guard(async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await
    }

    /// Race `operation` against the cancellation token, if any.
    async fn guard<R>(&self, operation: impl Future<Output = Result<R>>) -> Result<R> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(TxrunError::Cancelled),
                result = operation => result,
            },
            None => operation.await,
        }
    }
}

/// Abort failures are logged; the error that caused the abort is the one
/// reported to the caller.
async fn abort<S: ClientSession + ?Sized>(session: &mut S, cause: &TxrunError) {
    tracing::debug!(cause = %cause, "aborting transaction");
    if let Err(abort_err) = session.abort_transaction().await {
        tracing::warn!(error = %abort_err, cause = %cause, "failed to abort transaction");
    }
}
