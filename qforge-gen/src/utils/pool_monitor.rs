//! Monitored write transactions
//!
//! Every claim and clear runs inside a [`MonitoredTransaction`], which logs
//! how long the pool took to hand out a connection and how long the
//! connection was held.

use qforge_common::Result;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::time::Instant;

/// Logs the hold time when a transaction is dropped without commit/rollback
struct ReleaseGuard {
    caller: &'static str,
    acquired_at: Instant,
    armed: bool,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                "Long transaction dropped without commit"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, "Transaction dropped (rolled back)");
        }
    }
}

/// Transaction wrapper with acquisition/hold timing logs
pub struct MonitoredTransaction<'c> {
    tx: Transaction<'c, Sqlite>,
    guard: ReleaseGuard,
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection to run statements on
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        let MonitoredTransaction { tx, mut guard } = self;
        guard.armed = false;
        tx.commit().await?;
        log_release(guard.caller, guard.acquired_at, "commit");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        let MonitoredTransaction { tx, mut guard } = self;
        guard.armed = false;
        tx.rollback().await?;
        log_release(guard.caller, guard.acquired_at, "rollback");
        Ok(())
    }
}

fn log_release(caller: &'static str, acquired_at: Instant, how: &'static str) {
    let held_ms = acquired_at.elapsed().as_millis();
    if held_ms > 2000 {
        tracing::warn!(caller, held_ms, how, "Long transaction, connection held >2s");
    } else if held_ms > 1000 {
        tracing::info!(caller, held_ms, how, "Transaction held longer than expected");
    } else {
        tracing::debug!(caller, held_ms, how, "Connection released");
    }
}

/// Begin a transaction, logging pool wait time
///
/// ```ignore
/// let mut tx = begin_monitored(&pool, "hash_keys::try_claim").await?;
/// sqlx::query("...").execute(tx.conn()).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();
    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(caller, wait_ms, "Slow connection acquisition, pool may be saturated");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx,
        guard: ReleaseGuard {
            caller,
            acquired_at: Instant::now(),
            armed: true,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER)").execute(&pool).await.unwrap();
        pool
    }

    async fn row_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM t").fetch_one(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_commit_persists() {
        let pool = pool().await;
        let mut tx = begin_monitored(&pool, "test").await.unwrap();
        sqlx::query("INSERT INTO t VALUES (1)").execute(tx.conn()).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(row_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard() {
        let pool = pool().await;

        let mut tx = begin_monitored(&pool, "test").await.unwrap();
        sqlx::query("INSERT INTO t VALUES (1)").execute(tx.conn()).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = begin_monitored(&pool, "test").await.unwrap();
            sqlx::query("INSERT INTO t VALUES (2)").execute(tx.conn()).await.unwrap();
        }

        assert_eq!(row_count(&pool).await, 0);
    }
}
