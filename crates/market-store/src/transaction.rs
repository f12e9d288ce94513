//! Unit-of-work wrapper with transient-failure retry. Callers hand in a
//! closure that does its writes against the transaction connection; commit
//! happens only when the closure succeeds and the caller has not cancelled.

use std::time::Duration;

use futures_util::future::BoxFuture;
use ingest_core::IngestError;
use rand::Rng;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

const BACKOFF_BASE_MS: u64 = 100;

#[derive(Clone)]
pub struct TransactionService {
    pool: SqlitePool,
}

impl TransactionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Begin, run, commit; rollback on error or cancellation. Cancellation
    /// mid-closure drops the in-flight future and rolls back before returning.
    pub async fn execute_in_transaction<T, F>(
        &self,
        cancel: &CancellationToken,
        mut work: F,
    ) -> Result<T, IngestError>
    where
        F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, IngestError>>,
    {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let mut tx = self.pool.begin().await?;

        let result = {
            let fut = work(&mut tx);
            tokio::select! {
                _ = cancel.cancelled() => Err(IngestError::Cancelled),
                res = fut => res,
            }
        };

        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Retry the transaction on transient failures (deadlock, lock timeout,
    /// serialization, connection loss) with exponential backoff and jitter.
    /// Permanent failures surface immediately.
    pub async fn execute_with_retry<T, F>(
        &self,
        max_attempts: u32,
        cancel: &CancellationToken,
        mut work: F,
    ) -> Result<T, IngestError>
    where
        F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, IngestError>>,
    {
        let attempts = max_attempts.max(1);
        let mut last_err = IngestError::Database("no attempts made".to_string());

        for attempt in 0..attempts {
            if attempt > 0 {
                let jitter = rand::thread_rng().gen_range(0..50);
                let backoff =
                    Duration::from_millis(BACKOFF_BASE_MS * 2u64.pow(attempt - 1) + jitter);
                tracing::debug!(
                    "transaction retry {}/{} in {:?}: {}",
                    attempt + 1,
                    attempts,
                    backoff,
                    last_err
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            match self.execute_in_transaction(cancel, &mut work).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => last_err = err,
                Err(err) => return Err(err),
            }
        }

        Err(last_err)
    }
}
