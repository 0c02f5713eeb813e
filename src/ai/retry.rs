//! Retry Policy
//!
//! Exponential backoff around a single provider call, driven by `backon`.
//! Only errors whose category is retryable (rate limit, timeout, network,
//! transient) are retried; everything else returns on the first failure.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::debug;

use crate::constants::retry as retry_constants;
use crate::types::LlmError;

/// Backoff schedule and attempt ceiling for provider calls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first call included
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub factor: f32,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry_constants::MAX_ATTEMPTS,
            min_delay: Duration::from_secs(retry_constants::MIN_DELAY_SECS),
            max_delay: Duration::from_secs(retry_constants::MAX_DELAY_SECS),
            factor: retry_constants::BACKOFF_FACTOR,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retries back to back, for tests and local endpoints
    pub fn no_delay(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
            jitter: false,
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_attempts.saturating_sub(1));

        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    ///
    /// `on_retry` fires once per scheduled retry.
    pub async fn run<T, F, Fut>(&self, operation: F, on_retry: impl Fn()) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        operation
            .retry(self.backoff())
            .when(|err: &LlmError| err.is_retryable())
            .notify(|err: &LlmError, delay: Duration| {
                on_retry();
                debug!(
                    category = %err.category,
                    delay_ms = delay.as_millis() as u64,
                    hinted_delay_ms = err.retry_after.map(|d| d.as_millis() as u64),
                    error = %err.message,
                    "Retrying provider call"
                );
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCategory;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let retries = AtomicU32::new(0);
        let counter = &calls;

        let result = RetryPolicy::no_delay(5)
            .run(
                move || async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(LlmError::new(ErrorCategory::RateLimit, "slow down"))
                    } else {
                        Ok("done")
                    }
                },
                || {
                    retries.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = RetryPolicy::no_delay(5)
            .run(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(LlmError::new(ErrorCategory::ContentFilter, "blocked"))
                },
                || {},
            )
            .await;

        assert_eq!(result.unwrap_err().category, ErrorCategory::ContentFilter);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_ceiling() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = RetryPolicy::no_delay(8)
            .run(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(LlmError::timeout(Duration::from_millis(5)))
                },
                || {},
            )
            .await;

        assert_eq!(result.unwrap_err().category, ErrorCategory::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 8);
        assert_eq!(policy.min_delay, Duration::from_secs(4));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }
}
