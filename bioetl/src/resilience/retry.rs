//! Retry policy with exponential backoff and optional jitter.
//!
//! Only errors classified as transient (network, timeout, 429, 5xx) are
//! retried; everything else surfaces on the first failure.

use crate::errors::{EtlError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Configuration and decision logic for retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Maximum attempts including the first one (>= 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt, in seconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: f64,
    /// Upper bound on the un-jittered delay, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: f64,
    /// Multiplier applied per attempt (> 1).
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Multiply each delay by a uniform factor in `[0.5, 1.5]`.
    #[serde(default)]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    30.0
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_seconds: default_base_delay(),
            max_delay_seconds: default_max_delay(),
            backoff_factor: default_backoff_factor(),
            jitter: false,
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// Attempts are exhausted.
    GiveUp,
    /// The error is not transient.
    NotRetryable,
}

impl RetryPolicy {
    /// Creates a policy without jitter.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay_seconds: base_delay.as_secs_f64(),
            max_delay_seconds: max_delay.as_secs_f64(),
            backoff_factor,
            jitter: false,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Checks parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first bad parameter.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts < 1 {
            return Err(EtlError::config("retries.max_attempts must be >= 1"));
        }
        if self.backoff_factor <= 1.0 {
            return Err(EtlError::config("retries.backoff_factor must be > 1"));
        }
        if self.base_delay_seconds < 0.0 || self.max_delay_seconds < self.base_delay_seconds {
            return Err(EtlError::config(
                "retries delays must satisfy 0 <= base_delay <= max_delay",
            ));
        }
        Ok(())
    }

    /// True iff `attempt < max_attempts` and the error is transient.
    #[must_use]
    pub fn should_retry(&self, error: &EtlError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    ///
    /// `min(max_delay, base_delay * backoff_factor^(attempt - 1))`, jittered when enabled.
    #[must_use]
    pub fn get_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.base_delay_seconds * self.backoff_factor.powi(exponent);
        let mut delay = if raw.is_finite() {
            raw.min(self.max_delay_seconds)
        } else {
            self.max_delay_seconds
        };

        if self.jitter {
            delay *= rand::thread_rng().gen_range(0.5..=1.5);
        }

        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Decides what to do after `error` on attempt `attempt`.
    ///
    /// A `Retry-After` hint from the upstream raises the delay to at least that value.
    #[must_use]
    pub fn decide(&self, error: &EtlError, attempt: u32) -> RetryDecision {
        if !error.is_transient() {
            return RetryDecision::NotRetryable;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        let delay = self.get_delay(attempt);
        let delay = error.retry_after().map_or(delay, |hint| delay.max(hint));
        RetryDecision::Retry(delay)
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => match self.decide(&error, attempt) {
                    RetryDecision::Retry(delay) => {
                        tracing::debug!(
                            operation = %label,
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %error,
                            "Retrying after transient error"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        tracing::warn!(
                            operation = %label,
                            attempts = attempt,
                            error = %error,
                            "Retries exhausted"
                        );
                        return Err(error);
                    }
                    RetryDecision::NotRetryable => return Err(error),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn network_error() -> EtlError {
        EtlError::Network {
            url: "http://x".into(),
            message: "connection reset".into(),
        }
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(30), 2.0);
        assert_eq!(policy.get_delay(1), Duration::from_secs(1));
        assert_eq!(policy.get_delay(2), Duration::from_secs(2));
        assert_eq!(policy.get_delay(3), Duration::from_secs(4));
        assert_eq!(policy.get_delay(4), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_monotonic_and_bounded() {
        let policy = RetryPolicy::new(50, Duration::from_millis(250), Duration::from_secs(10), 3.0);
        let mut previous = Duration::ZERO;
        for attempt in 1..50 {
            let delay = policy.get_delay(attempt);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(10));
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(30), 2.0)
            .with_jitter(true);
        for _ in 0..100 {
            let delay = policy.get_delay(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_should_retry_respects_kind_and_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&network_error(), 1));
        assert!(policy.should_retry(&network_error(), 2));
        assert!(!policy.should_retry(&network_error(), 3));
        assert!(!policy.should_retry(&EtlError::parse("bad json"), 1));
    }

    #[test]
    fn test_decide_honours_retry_after() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1), 2.0);
        let throttled = EtlError::RateLimited {
            url: "http://x".into(),
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(policy.decide(&throttled, 1), RetryDecision::Retry(Duration::from_secs(5)));
        assert_eq!(policy.decide(&throttled, 3), RetryDecision::GiveUp);
        assert_eq!(
            policy.decide(&EtlError::config("x"), 1),
            RetryDecision::NotRetryable
        );
    }

    #[test]
    fn test_validate_rejects_bad_factor() {
        let mut policy = RetryPolicy::default();
        policy.backoff_factor = 1.0;
        assert!(policy.validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_retries_transient_then_succeeds() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30), 2.0);
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = policy
            .execute("fetch", |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(network_error())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_stops_on_permanent_error() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .execute("fetch", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(EtlError::parse("garbage")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
