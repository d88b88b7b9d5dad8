//! Uniform retry with exponential backoff for collaborator calls
//!
//! One retry mechanism serves every stage, parameterized by the stage's
//! [`RetryPolicy`]. Adapters never retry internally; they classify failures
//! and the orchestrator decides here. A timeout counts against the same
//! attempt budget as a transient network failure.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use clipflow_config::RetryPolicy;
use clipflow_utils::{ErrorKind, RecordedError, StageError};

/// Run `op` under `policy`, retrying retryable failures with backoff.
///
/// Each attempt is bounded by `timeout`; an elapsed timeout is classified
/// [`ErrorKind::Timeout`] and retried like a transient failure. The returned
/// error carries the final classification and the number of attempts made,
/// ready to be recorded on a ledger transition.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    timeout: Duration,
    stage: &str,
    op: F,
) -> Result<T, RecordedError>
where
    E: StageError,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let (kind, message) = match tokio::time::timeout(timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => (e.kind(), e.to_string()),
            Err(_) => (
                ErrorKind::Timeout,
                format!("{stage} call exceeded {}s", timeout.as_secs()),
            ),
        };

        if kind.is_retryable() && attempts < policy.max_attempts {
            let delay = policy.delay_for(attempts);
            warn!(
                stage,
                attempt = attempts,
                max_attempts = policy.max_attempts,
                kind = %kind,
                delay_ms = delay.as_millis() as u64,
                "retryable stage failure; backing off"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        return Err(RecordedError {
            kind,
            message,
            attempts,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum FakeError {
        #[error("rate limited")]
        RateLimited,
        #[error("bad credentials")]
        Auth,
    }

    impl StageError for FakeError {
        fn kind(&self) -> ErrorKind {
            match self {
                Self::RateLimited => ErrorKind::RateLimited,
                Self::Auth => ErrorKind::Auth,
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(fast_policy(5), Duration::from_secs(5), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(FakeError::RateLimited)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausts_attempts_on_persistent_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry(fast_policy(3), Duration::from_secs(5), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::RateLimited) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry(fast_policy(5), Duration::from_secs(5), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Auth) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_is_retryable_and_counted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), RecordedError> =
            with_retry(fast_policy(2), Duration::from_millis(10), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<(), FakeError>(())
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(err.attempts, 2);
    }
}
