// In crates/execution/src/retry.rs

use api_client::ErrorKind;
use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// Bounded exponential backoff for exchange calls.
///
/// `Temporary` and `RateLimited` failures are retried up to `max_attempts`
/// total attempts; a rate-limit hint replaces the computed delay. `Unknown` gets
/// a single retry. Every other kind fails on the first occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(3),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(retry);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Runs `call` until it succeeds, fails with a non-retryable kind, or the
    /// attempts run out. Each attempt is bounded by `call_timeout`.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, call_timeout: Duration, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = api_client::Result<T>>,
    {
        let mut attempt: u32 = 0;
        let mut seen_unknown = false;
        loop {
            attempt += 1;
            let err = match tokio::time::timeout(call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => Error::from(e),
                Err(_) => Error::Timeout {
                    operation,
                    after: call_timeout,
                },
            };

            let kind = err.kind();
            let retryable = match kind {
                ErrorKind::Temporary | ErrorKind::RateLimited => true,
                ErrorKind::Unknown => !std::mem::replace(&mut seen_unknown, true),
                _ => false,
            };
            if !retryable || attempt >= self.max_attempts.max(1) {
                return Err(err);
            }

            let delay = err.retry_after().unwrap_or_else(|| self.backoff_for(attempt - 1));
            tracing::warn!(
                operation,
                attempt,
                kind = %kind,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Exchange call failed; retrying."
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2,
        }
    }

    async fn run_with(policy: &RetryPolicy, errors: Vec<api_client::Error>) -> (Result<u32>, u32) {
        let calls = AtomicU32::new(0);
        let errors = std::sync::Mutex::new(errors.into_iter());
        let result = policy
            .run("test_call", Duration::from_secs(1), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                let next = errors.lock().expect("errors lock").next();
                async move {
                    match next {
                        Some(err) => Err(err),
                        None => Ok(n),
                    }
                }
            })
            .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(0), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(5), Duration::from_secs(3));
        assert_eq!(policy.backoff_for(40), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn temporary_errors_are_retried_until_success() {
        let (result, calls) = run_with(
            &fast_policy(3),
            vec![api_client::Error::Network("reset".into()), api_client::Error::Timeout("slow".into())],
        )
        .await;
        assert_eq!(result.ok(), Some(3));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let errors = (0..5).map(|_| api_client::Error::Network("down".into())).collect();
        let (result, calls) = run_with(&fast_policy(3), errors).await;
        assert!(matches!(result, Err(Error::ApiClientError(api_client::Error::Network(_)))));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn invalid_params_fail_fast() {
        let (result, calls) = run_with(&fast_policy(5), vec![api_client::Error::InvalidParam("tick".into())]).await;
        assert!(matches!(result.map_err(|e| e.kind()), Err(ErrorKind::InvalidParam)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn unknown_is_retried_once() {
        let errors = (0..3).map(|_| api_client::Error::CustomError("??".into())).collect();
        let (result, calls) = run_with(&fast_policy(5), errors).await;
        assert!(matches!(result.map_err(|e| e.kind()), Err(ErrorKind::Unknown)));
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn rate_limit_hint_is_honored() {
        let started = std::time::Instant::now();
        let (result, _) = run_with(
            &fast_policy(2),
            vec![api_client::Error::RateLimited {
                retry_after: Some(Duration::from_millis(30)),
            }],
        )
        .await;
        assert!(result.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn slow_calls_time_out_as_temporary() {
        let policy = fast_policy(1);
        let result: Result<()> = policy
            .run("slow_call", Duration::from_millis(10), || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout { operation: "slow_call", .. })));
    }
}
