//! Step retry logic
//!
//! Every pipeline step is one retryable unit of work: transient failures
//! are retried with exponential backoff up to a bounded attempt count, then
//! escalate as fatal for that step. Non-transient failures never retry.

use std::time::Duration;
use triage_common::Result;

/// Backoff ceiling between attempts
const MAX_BACKOFF_MS: u64 = 10_000;

/// Retry an operation with bounded attempts and exponential backoff.
///
/// Only errors classified transient by [`triage_common::Error::is_transient`]
/// are retried; anything else propagates immediately.
pub async fn retry_step<F, Fut, T>(
    step_name: &str,
    max_attempts: u32,
    initial_backoff_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff_ms = initial_backoff_ms.max(1);

    for attempt in 1..=max_attempts.max(1) {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(step = step_name, attempt, "Step succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) if err.is_transient() && attempt < max_attempts => {
                tracing::warn!(
                    step = step_name,
                    attempt,
                    backoff_ms,
                    error = %err,
                    "Transient step failure, will retry after backoff"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
            Err(err) => {
                tracing::error!(
                    step = step_name,
                    attempt,
                    error = %err,
                    "Step failed"
                );
                return Err(err);
            }
        }
    }

    unreachable!("retry loop always returns within max_attempts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use triage_common::Error;

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let result = retry_step("fetch", 3, 1, || async { Ok::<_, Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let attempts = AtomicU32::new(0);

        let result = retry_step("fetch", 5, 1, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Transient("flaky".to_string()))
                } else {
                    Ok(99)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 99);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempt_cap() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = retry_step("fetch", 3, 1, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Transient("still down".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = retry_step("cluster", 3, 1, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Clustering("bad batch".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
