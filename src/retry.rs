//! Bounded retry for chat API calls

use crate::api::ApiError;
use std::future::Future;
use std::time::Duration;

/// Run `call`, retrying up to `retries` additional times while the error is
/// retryable. Backoff doubles from `backoff` on each attempt.
pub async fn with_retries<T, F, Fut>(
    retries: u32,
    backoff: Duration,
    mut call: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                let delay = retry_delay(backoff, attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Retrying chat API call"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn retry_delay(backoff: Duration, attempt: u32) -> Duration {
    backoff.saturating_mul(1 << (attempt.saturating_sub(1)).min(6))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retries(2, Duration::from_millis(10), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ApiError::network("flaky"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retry_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(2, Duration::from_millis(10), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::server_error("down"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(2, Duration::from_millis(10), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::auth("bad token"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_delay_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(retry_delay(base, 1), Duration::from_millis(100));
        assert_eq!(retry_delay(base, 2), Duration::from_millis(200));
        assert_eq!(retry_delay(base, 3), Duration::from_millis(400));
    }
}
