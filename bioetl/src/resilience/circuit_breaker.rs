//! Circuit breaker for a remote endpoint.

use crate::errors::{EtlError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests pass; consecutive failures are counted.
    Closed,
    /// Requests are refused until the recovery timeout elapses.
    Open,
    /// One probe request is in flight.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Breaker parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a probe is allowed.
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_seconds: f64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> f64 {
    60.0
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_seconds: default_recovery_timeout(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Checks parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero threshold or negative timeout.
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(EtlError::config("circuit_breaker.failure_threshold must be >= 1"));
        }
        if !(self.recovery_timeout_seconds.is_finite() && self.recovery_timeout_seconds >= 0.0) {
            return Err(EtlError::config(
                "circuit_breaker.recovery_timeout_seconds must be >= 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Closed / open / half-open state machine shared by all calls of a run.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Creates a breaker from config.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(
            name,
            config.failure_threshold,
            Duration::from_secs_f64(config.recovery_timeout_seconds.max(0.0)),
        )
    }

    /// Name of the guarded endpoint.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. An open breaker whose timeout has elapsed still reports
    /// `Open` until the next call is admitted.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Number of consecutive failures seen while closed.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Returns true if a call may proceed.
    ///
    /// After the recovery timeout, the first caller moves the breaker to
    /// half-open and becomes the probe; others are refused until it reports.
    #[must_use]
    pub fn admit(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::MAX, |opened| opened.elapsed());
                if elapsed >= self.recovery_timeout {
                    tracing::info!(breaker = %self.name, "Circuit half-open, admitting probe");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Like [`CircuitBreaker::admit`] but returns `CIRCUIT_OPEN` on refusal.
    ///
    /// # Errors
    ///
    /// Returns `EtlError::CircuitOpen` when the call is refused.
    pub fn allow(&self) -> Result<()> {
        if self.admit() {
            Ok(())
        } else {
            Err(EtlError::CircuitOpen {
                endpoint: self.name.clone(),
            })
        }
    }

    /// Admits a call and returns a permit that reports its outcome.
    ///
    /// # Errors
    ///
    /// Returns `EtlError::CircuitOpen` when the call is refused.
    pub fn permit(&self) -> Result<CallPermit<'_>> {
        self.allow()?;
        Ok(CallPermit {
            breaker: self,
            reported: false,
        })
    }

    /// Frees the half-open probe slot of a call that never reported.
    fn release_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen && inner.probe_in_flight {
            tracing::debug!(breaker = %self.name, "Probe abandoned, slot released");
            inner.probe_in_flight = false;
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(breaker = %self.name, "Circuit closed after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "Circuit opened"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                tracing::warn!(breaker = %self.name, "Probe failed, circuit re-opened");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
        }
    }
}

/// One admitted call. Dropping it without an outcome (the caller was
/// cancelled or timed out) leaves the counters alone and frees the probe slot.
#[derive(Debug)]
#[must_use = "report the outcome with `success` or `failure`"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    reported: bool,
}

impl CallPermit<'_> {
    /// Reports a successful call.
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.record_success();
    }

    /// Reports a failed call.
    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.release_probe();
        }
    }
}
