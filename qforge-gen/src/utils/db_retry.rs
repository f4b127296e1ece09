//! Lock-aware retry for SQLite writes
//!
//! Concurrent topic runs share one WAL database; a writer can find the
//! database locked for a moment. Writes go through [`retry_on_lock`], which
//! backs off exponentially until `gen_database_max_lock_wait_ms` elapses.

use qforge_common::{Error, Result};
use sqlx::SqlitePool;
use std::time::{Duration, Instant};

/// Settings key bounding total retry time
pub const MAX_LOCK_WAIT_SETTING: &str = "gen_database_max_lock_wait_ms";

/// Used when the setting is absent
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Read the lock wait bound from settings
pub async fn max_lock_wait_ms(pool: &SqlitePool) -> u64 {
    let value: Option<i64> =
        sqlx::query_scalar("SELECT CAST(value AS INTEGER) FROM settings WHERE key = ?")
            .bind(MAX_LOCK_WAIT_SETTING)
            .fetch_optional(pool)
            .await
            .ok()
            .flatten();

    value
        .filter(|v| *v > 0)
        .map(|v| v as u64)
        .unwrap_or(DEFAULT_MAX_LOCK_WAIT_MS)
}

/// Retry `operation` while it fails with a lock error, up to `max_wait_ms`.
///
/// Backoff starts at 10ms and doubles up to 1000ms. Any other error is
/// returned immediately.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt: u32 = 0;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    let elapsed_ms = start.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Write succeeded after a long lock wait"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Write succeeded after retry"
                        );
                    }
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_database_locked() {
            return Err(err);
        }

        let elapsed = start.elapsed();
        if elapsed >= max_duration {
            tracing::error!(
                operation = operation_name,
                attempt,
                elapsed_ms = elapsed.as_millis(),
                max_wait_ms,
                "Database still locked, giving up"
            );
            return Err(Error::Internal(format!(
                "{}: database locked after {} attempts ({} ms)",
                operation_name,
                attempt,
                elapsed.as_millis()
            )));
        }

        tracing::warn!(
            operation = operation_name,
            attempt,
            backoff_ms,
            remaining_ms = max_duration.saturating_sub(elapsed).as_millis(),
            "Database locked, backing off"
        );

        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn lock_error() -> Error {
        Error::Database(sqlx::Error::Protocol("database is locked".to_string()))
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_lock_errors_are_retried() {
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = retry_on_lock("test_op", 5000, move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(lock_error())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_wait() {
        let result = retry_on_lock("test_op", 30, || async { Err::<i32, Error>(lock_error()) }).await;

        match result {
            Err(Error::Internal(msg)) => assert!(msg.contains("database locked")),
            other => panic!("Expected Internal error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_errors_fail_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = retry_on_lock("test_op", 5000, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, Error>(Error::Internal("disk full".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_max_lock_wait_reads_setting() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        qforge_common::db::create_settings_table(&pool).await.unwrap();

        assert_eq!(max_lock_wait_ms(&pool).await, DEFAULT_MAX_LOCK_WAIT_MS);

        sqlx::query("INSERT INTO settings (key, value) VALUES (?, '1200')")
            .bind(MAX_LOCK_WAIT_SETTING)
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(max_lock_wait_ms(&pool).await, 1200);
    }
}
