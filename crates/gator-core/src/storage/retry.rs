//! Bounded retry for writes that race other connections on the same SQLite file.
//!
//! The command layer and a running aggregator share one database, so a
//! scheduler write can occasionally hit a lock held by a concurrent command
//! even with a busy timeout configured. Only lock contention is retried;
//! every other error is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

pub const MAX_RETRIES: u32 = 3;

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes
/// SQLITE_BUSY_RECOVERY (261), SQLITE_LOCKED_SHAREDCACHE (262),
/// SQLITE_BUSY_SNAPSHOT (517).
pub fn is_lock_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code();
            matches!(
                code.as_deref(),
                Some("5") | Some("6") | Some("261") | Some("262") | Some("517")
            )
        }
        _ => false,
    }
}

/// 100ms, 200ms, 400ms
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2u64.pow(attempt.saturating_sub(1)))
}

pub async fn with_retry<F, Fut, T>(operation: F) -> std::result::Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    loop {
        match operation().await {
            Err(e) if is_lock_contention(&e) && attempts < MAX_RETRIES => {
                attempts += 1;
                let delay = backoff_delay(attempts);
                tracing::debug!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Database locked, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
