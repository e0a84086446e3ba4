//! Resilience primitives guarding calls to the remote source.
//!
//! This module provides:
//! - `RateLimiter`: token bucket with continuous refill
//! - `RetryPolicy`: exponential backoff with optional jitter
//! - `CircuitBreaker`: closed / open / half-open state machine

mod circuit_breaker;
mod rate_limiter;
mod retry;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{RetryDecision, RetryPolicy};
