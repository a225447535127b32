//! Retry utilities for async operations
//!
//! Configurable retry policies with exponential backoff and jitter for
//! transient failures: store writes during execution, dispatch calls to
//! workers, registry heartbeats.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Configuration for retrying failed operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: usize,

    /// Initial interval between retries in seconds
    pub initial_interval: f64,

    /// Multiplier for the interval after each retry
    pub backoff_factor: f64,

    /// Maximum interval between retries in seconds
    pub max_interval: f64,

    /// Whether to add random jitter to intervals
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a new retry policy with the given max attempts
    ///
    /// ```rust
    /// use tooling::async_utils::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(3);
    /// assert_eq!(policy.max_attempts, 3);
    /// ```
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 30.0,
            jitter: true,
        }
    }

    /// Policy for durable writes made while an execution is in flight.
    ///
    /// Checkpoints must not be silently dropped, so this keeps trying for
    /// roughly a minute before giving up.
    pub fn store_writes() -> Self {
        Self::new(8)
            .with_initial_interval(0.25)
            .with_backoff_factor(2.0)
            .with_max_interval(15.0)
    }

    /// Policy for requeueing jobs a worker refused or could not receive
    pub fn dispatch() -> Self {
        Self::new(6)
            .with_initial_interval(1.0)
            .with_backoff_factor(2.0)
            .with_max_interval(60.0)
    }

    /// Set the initial interval between retries
    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    /// Set the backoff factor
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the maximum interval between retries
    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay before retry number `attempt` (0-indexed)
    ///
    /// `initial_interval * backoff_factor ^ attempt`, capped at
    /// `max_interval`, scaled by a jitter factor in `0.5..=1.5` when enabled.
    /// Unlike [`should_retry`](Self::should_retry) this never returns zero for
    /// large attempts, so callers requeueing work indefinitely still back off.
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(i32::MAX as usize) as i32;
        let base_delay = self.initial_interval * self.backoff_factor.powi(exponent);
        let capped_delay = base_delay.min(self.max_interval).max(0.0);

        let final_delay = if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Check if more attempts are allowed after `attempt` attempts
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Execute an async operation, retrying every error until the policy is
/// exhausted
///
/// The operation must be idempotent.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_if(policy, |_| true, operation).await
}

/// Execute an async operation, retrying only errors accepted by `retryable`
///
/// Non-retryable errors are returned immediately. When all attempts are
/// used up the last error is returned.
pub async fn with_retry_if<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    retryable: P,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;

                if !retryable(&error) || !policy.should_retry(attempt) {
                    if attempt > 1 {
                        tracing::warn!("Giving up after {} attempts: {}", attempt, error);
                    }
                    return Err(error);
                }

                let delay = policy.calculate_delay(attempt - 1);
                tracing::debug!(
                    "Attempt {} failed: {}. Retrying in {:?}",
                    attempt,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_interval, 0.5);
        assert_eq!(policy.backoff_factor, 2.0);
        assert!(policy.jitter);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval(1.0)
            .with_backoff_factor(2.0)
            .with_max_interval(100.0)
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(0).as_secs_f64(), 1.0);
        assert_eq!(policy.calculate_delay(1).as_secs_f64(), 2.0);
        assert_eq!(policy.calculate_delay(3).as_secs_f64(), 8.0);
    }

    #[test]
    fn test_delay_capped_past_max_attempts() {
        let policy = RetryPolicy::new(2)
            .with_initial_interval(10.0)
            .with_max_interval(50.0)
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(5).as_secs_f64(), 50.0);
        assert_eq!(policy.calculate_delay(40).as_secs_f64(), 50.0);
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::new(5).with_initial_interval(1.0);

        for _ in 0..20 {
            let delay = policy.calculate_delay(2).as_secs_f64();
            assert!((2.0..=6.0).contains(&delay));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_eventually_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(5).with_jitter(false);

        let result: Result<&str, String> = with_retry(&policy, || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("store unavailable".to_string())
                } else {
                    Ok("written")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "written");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_returns_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(3).with_jitter(false);

        let result: Result<(), String> = with_retry(&policy, || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(format!("failure {}", n))
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), "failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_if_stops_on_permanent_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(5);

        let result: Result<(), String> = with_retry_if(
            &policy,
            |e: &String| !e.starts_with("invalid"),
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("invalid payload".to_string())
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
