//! Retry helper
//!
//! Applies a [`RetryPolicy`] to an infrastructure call. Every controller
//! call that may be retried goes through [`with_retry`].

use cutover_core::domain::retry::RetryPolicy;
use std::fmt::Display;
use std::future::Future;
use tracing::{error, info, warn};

/// The policy's attempt ceiling was reached
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {last_error}")]
pub struct RetryExhausted {
    pub operation: String,
    pub attempts: u32,
    pub last_error: String,
}

/// Runs `call` until it succeeds or `policy.max_attempts` is reached
///
/// Sleeps `policy.delay_after(n)` between attempts.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, RetryExhausted>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded after {} attempt(s)", operation, attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt >= max_attempts {
                    error!("{} failed after {} attempts: {}", operation, attempt, e);
                    return Err(RetryExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }

                let delay = policy.delay_after(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 1_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = with_retry(&policy(5), "shift", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err("unavailable") } else { Ok(n) }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        // 100ms + 200ms of backoff on virtual time
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let calls = AtomicU32::new(0);

        let err = with_retry(&policy(3), "decommission pool", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("provider down")
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.operation, "decommission pool");
        assert_eq!(
            err.to_string(),
            "decommission pool failed after 3 attempt(s): provider down"
        );
    }
}
