//! Retry with exponential backoff for rate-limited downstream calls.
//!
//! Only errors that signal throttling are retried. Anything else is
//! returned to the caller after the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Classifies an error as a downstream "too many requests" signal.
pub trait Throttling {
    fn is_throttled(&self) -> bool;
}

/// Retry policy for downstream calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry; doubles with every further retry
    pub base_delay: Duration,

    /// Upper bound of the uniform random jitter added to every delay
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Policy with the given retry budget and default delays.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Deterministic part of the delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Full delay: backoff plus uniform jitter in `[0, max_jitter]`.
    fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        self.backoff(attempt) + jitter
    }
}

impl Default for RetryPolicy {
    /// 3 retries, 1s base delay, up to 1s jitter.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

/// Runs downstream calls under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct ResilientInvoker {
    policy: RetryPolicy,
}

impl ResilientInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `operation` until it succeeds, fails with a non-throttling
    /// error, or the retry budget is spent. The last error is returned.
    pub async fn invoke<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Throttling + std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Call succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_throttled() => return Err(e),
                Err(e) => {
                    if attempt >= self.policy.max_retries {
                        warn!(attempts = attempt + 1, error = %e, "Retries exhausted");
                        return Err(e);
                    }

                    let delay = self.policy.delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Throttled, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Throttled,
        Broken,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Throttling for FakeError {
        fn is_throttled(&self) -> bool {
            matches!(self, FakeError::Throttled)
        }
    }

    fn fast_invoker(max_retries: u32) -> ResilientInvoker {
        ResilientInvoker::new(
            RetryPolicy::new(max_retries)
                .with_base_delay(Duration::ZERO)
                .with_max_jitter(Duration::from_millis(2)),
        )
    }

    #[tokio::test]
    async fn test_retries_throttling_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fast_invoker(3)
            .invoke(|| {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(FakeError::Throttled)
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("success"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fast_invoker(3)
            .invoke(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(FakeError::Broken)
                }
            })
            .await;

        assert_eq!(result, Err(FakeError::Broken));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = fast_invoker(2)
            .invoke(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(FakeError::Throttled)
                }
            })
            .await;

        assert_eq!(result, Err(FakeError::Throttled));
        assert_eq!(counter.load(Ordering::SeqCst), 3); // 1 initial + 2 retries
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_jitter_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..20 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_policy_builder() {
        let policy = RetryPolicy::new(5)
            .with_base_delay(Duration::from_millis(200))
            .with_max_jitter(Duration::ZERO);

        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(200));
        assert_eq!(policy.delay(0), Duration::from_millis(200));
    }
}
