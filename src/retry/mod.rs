//! Retry logic for outbound API calls with exponential backoff

use crate::error::{ProductboardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry (in milliseconds)
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay (in milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings
    pub fn new(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay after the given failed attempt (1-based): `min(max, initial * 2^(attempt-1))`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self.initial_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Reject policies that can never make an attempt
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ProductboardError::config("Retry max_attempts must be at least 1"));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ProductboardError::config(
                "Retry initial_delay_ms must not exceed max_delay_ms",
            ));
        }
        Ok(())
    }
}

/// Decides whether a failed attempt should be retried
pub type RetryCondition = Arc<dyn Fn(&ProductboardError) -> bool + Send + Sync>;

/// Wraps an operation in the retry policy
#[derive(Clone)]
pub struct RetryHandler {
    policy: RetryPolicy,
    retry_condition: RetryCondition,
}

impl fmt::Debug for RetryHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHandler")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryHandler {
    /// Create a retry handler using `ProductboardError::is_retryable` as the condition
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retry_condition: Arc::new(ProductboardError::is_retryable),
        }
    }

    /// Replace the retry condition
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&ProductboardError) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Arc::new(condition);
        self
    }

    /// Get the policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is exhausted. The last error is returned.
    pub async fn with_retries<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !(self.retry_condition)(&error) {
                        debug!(
                            operation = operation_name,
                            attempt,
                            category = error.category(),
                            error = %error,
                            "Error is not retryable, failing immediately"
                        );
                        return Err(error);
                    }

                    if attempt >= max_attempts {
                        error!(
                            operation = operation_name,
                            total_attempts = attempt,
                            error = %error,
                            "All retry attempts exhausted, failing"
                        );
                        return Err(error);
                    }

                    let delay = self.policy.calculate_delay(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Operation failed, retrying after delay"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_policy_delay_calculation() {
        let policy = RetryPolicy::new(5, 1000, 5000);

        assert_eq!(policy.calculate_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.calculate_delay(4), Duration::from_millis(5000));
        assert_eq!(policy.calculate_delay(60), Duration::from_millis(5000));
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::new(0, 10, 100).validate().is_err());
        assert!(RetryPolicy::new(3, 1000, 10).validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_max_attempts_for_retryable_errors() {
        let handler = RetryHandler::new(RetryPolicy::new(4, 100, 1000));
        let attempts = AtomicU32::new(0);

        let result: Result<()> = handler
            .with_retries("always_fails", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProductboardError::server_error("unavailable", 503)) }
            })
            .await;

        assert!(matches!(result, Err(ProductboardError::ServerError { status: 503, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_when_condition_rejects() {
        let handler = RetryHandler::new(RetryPolicy::new(5, 100, 1000)).with_condition(|_| false);
        let attempts = AtomicU32::new(0);

        let result: Result<()> = handler
            .with_retries("rejected", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProductboardError::server_error("boom", 500)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_errors_are_not_retried() {
        let handler = RetryHandler::default();
        let attempts = AtomicU32::new(0);

        let result: Result<()> = handler
            .with_retries("validation", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProductboardError::validation("Validation failed")) }
            })
            .await;

        assert!(matches!(result, Err(ProductboardError::Validation { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry_uses_backoff() {
        let handler = RetryHandler::new(RetryPolicy::new(3, 200, 1000));
        let attempts = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = handler
            .with_retries("flaky", || {
                let count = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err(ProductboardError::rate_limit("slow down", 60))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 200ms after the first failure, 400ms after the second
        assert!(start.elapsed() >= Duration::from_millis(600));
    }
}
