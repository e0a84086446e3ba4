//! Token-bucket rate limiter.

use crate::errors::{EtlError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Rate-limit budget from the provider config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Steady-state tokens per second.
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Maximum burst.
    #[serde(default = "default_capacity")]
    pub capacity: f64,
}

fn default_rate() -> f64 {
    5.0
}

fn default_capacity() -> f64 {
    5.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket shared by every request of one pipeline run.
///
/// Refill is continuous: `tokens = min(capacity, tokens + elapsed * rate)`.
/// The bucket starts full.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a limiter.
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless `rate > 0` and `capacity >= 1`.
    pub fn new(rate: f64, capacity: f64) -> Result<Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(EtlError::config(format!("rate limit rate must be > 0, got {rate}")));
        }
        if !(capacity.is_finite() && capacity >= 1.0) {
            return Err(EtlError::config(format!(
                "rate limit capacity must be >= 1, got {capacity}"
            )));
        }
        Ok(Self {
            rate,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Creates a limiter from config.
    ///
    /// # Errors
    ///
    /// See [`RateLimiter::new`].
    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        Self::new(config.rate, config.capacity)
    }

    /// Tokens per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Burst capacity.
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Currently available tokens after refill.
    #[must_use]
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    /// Takes a token if one is available, otherwise returns the wait needed.
    fn try_take(&self) -> std::result::Result<(), Duration> {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate))
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = elapsed.mul_add(self.rate, bucket.tokens).min(self.capacity);
        bucket.last_refill = now;
    }

    /// Waits until one token is available and takes it.
    pub async fn acquire(&self) {
        loop {
            match self.try_take() {
                Ok(()) => return,
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Like [`RateLimiter::acquire`], but gives up at `deadline`.
    ///
    /// # Errors
    ///
    /// Returns `EtlError::Timeout` if no token can be taken before the deadline.
    pub async fn acquire_until(&self, deadline: Instant) -> Result<()> {
        loop {
            match self.try_take() {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    if Instant::now() + wait > deadline {
                        return Err(EtlError::Timeout(
                            "rate limiter token not available before deadline".into(),
                        ));
                    }
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(RateLimiter::new(0.0, 5.0).is_err());
        assert!(RateLimiter::new(5.0, 0.5).is_err());
        assert!(RateLimiter::new(f64::NAN, 5.0).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_immediate() {
        let limiter = RateLimiter::new(1.0, 3.0).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttles_twenty_requests_at_five_per_second() {
        let limiter = RateLimiter::new(5.0, 5.0).unwrap();
        let start = Instant::now();
        for _ in 0..20 {
            limiter.acquire().await;
        }
        let elapsed = start.elapsed();

        // (N - capacity) / rate = (20 - 5) / 5
        assert!(elapsed >= Duration::from_secs(3));
        let observed_rate = 20.0 / elapsed.as_secs_f64();
        assert!(observed_rate <= 5.0 + 5.0 / 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_budget() {
        let limiter = Arc::new(RateLimiter::new(10.0, 2.0).unwrap());
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_until_times_out() {
        let limiter = RateLimiter::new(1.0, 1.0).unwrap();
        limiter.acquire().await;

        let deadline = Instant::now() + Duration::from_millis(100);
        let err = limiter.acquire_until(deadline).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Timeout);

        let deadline = Instant::now() + Duration::from_secs(2);
        assert!(limiter.acquire_until(deadline).await.is_ok());
    }
}
