//! Per-tool circuit breaker.
//!
//! A tool that keeps failing (a search API over quota, a site that blocks every
//! request) is skipped by the fallback chain for a recovery window instead of
//! burning a fetch attempt on every query.
//!
//! # Circuit States
//!
//! ```text
//! CLOSED (healthy) --[N failures]--> OPEN (skipped) --[timeout]--> HALF_OPEN (probing)
//!                                                                         |
//!                                       <--[failure]--                    |
//!                                                                         |
//! CLOSED <---------------------------[success]----------------------------+
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::AppError;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// The tool is skipped.
    Open,
    /// Probing: the next request decides whether to close or reopen.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,

    /// Number of successful probes in half-open state to close the circuit.
    pub success_threshold: u32,

    /// Time to wait before transitioning from Open to Half-Open.
    pub recovery_timeout: Duration,

    /// Multiplier applied to the recovery timeout when the tool was rate limited.
    pub rate_limit_backoff_multiplier: f32,

    /// Maximum recovery timeout after rate limit backoffs.
    pub max_recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(30),
            rate_limit_backoff_multiplier: 2.0,
            max_recovery_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    last_error_message: Option<String>,
    current_recovery_timeout: Duration,
}

impl CircuitBreakerInner {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
            last_error_message: None,
            current_recovery_timeout: config.recovery_timeout,
        }
    }

    fn remaining(&self) -> Duration {
        self.opened_at
            .map(|t| self.current_recovery_timeout.saturating_sub(t.elapsed()))
            .unwrap_or(self.current_recovery_timeout)
    }
}

/// Snapshot of a breaker for the stats endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_error: Option<String>,
    /// Seconds until an open circuit starts probing again.
    pub retry_after_secs: Option<u64>,
}

/// Thread-safe circuit breaker guarding one scraping tool.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<CircuitBreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let inner = CircuitBreakerInner::new(&config);
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, CircuitBreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Returns the current state, handling lazy Open → HalfOpen transitions.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    /// Whether a request may go through now. When the circuit is open,
    /// returns how long until it starts probing.
    pub fn allow(&self) -> Result<(), Duration> {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);
        match inner.state {
            CircuitState::Open => Err(inner.remaining()),
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.lock_inner();
        self.maybe_transition_to_half_open(&mut inner);

        let retry_after_secs = (inner.state == CircuitState::Open).then(|| inner.remaining().as_secs());

        CircuitBreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            last_error: inner.last_error_message.clone(),
            retry_after_secs,
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock_inner();

        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    tracing::info!(
                        circuit = %self.name,
                        "Circuit breaker closing after {} successful probes",
                        inner.success_count
                    );
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                    inner.current_recovery_timeout = self.config.recovery_timeout;
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Count a failure. Errors that say nothing about the tool's health
    /// (validation, configuration) are ignored.
    pub fn record_failure(&self, error: &AppError) {
        let mut inner = self.lock_inner();
        inner.last_error_message = Some(error.to_string());

        if !error.should_trip_circuit() {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        circuit = %self.name,
                        failures = inner.failure_count,
                        error = %error,
                        "Circuit breaker opening after {} consecutive failures",
                        inner.failure_count
                    );
                    self.open(&mut inner, error.is_rate_limit());
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(
                    circuit = %self.name,
                    error = %error,
                    "Circuit breaker probe failed, returning to open state"
                );
                inner.success_count = 0;
                self.open(&mut inner, error.is_rate_limit());
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut CircuitBreakerInner, rate_limited: bool) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        if rate_limited {
            inner.current_recovery_timeout = std::cmp::min(
                Duration::from_secs_f32(
                    inner.current_recovery_timeout.as_secs_f32()
                        * self.config.rate_limit_backoff_multiplier,
                ),
                self.config.max_recovery_timeout,
            );
            tracing::info!(
                circuit = %self.name,
                recovery_timeout_secs = inner.current_recovery_timeout.as_secs(),
                "Extended recovery timeout due to rate limit"
            );
        }
    }

    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        tracing::info!(circuit = %self.name, "Circuit breaker manually reset");
        *inner = CircuitBreakerInner::new(&self.config);
    }

    fn maybe_transition_to_half_open(&self, inner: &mut CircuitBreakerInner) {
        if inner.state == CircuitState::Open
            && let Some(opened_at) = inner.opened_at
            && opened_at.elapsed() >= inner.current_recovery_timeout
        {
            tracing::info!(
                circuit = %self.name,
                "Circuit breaker transitioning to half-open state"
            );
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> AppError {
        AppError::NetworkError("connection reset".into())
    }

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::new("firecrawl", CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow().is_ok());
    }

    #[test]
    fn test_opens_after_five_failures_by_default() {
        let cb = CircuitBreaker::new("brave", CircuitBreakerConfig::default());
        for _ in 0..4 {
            cb.record_failure(&network());
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure(&network());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow().is_err());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("http", CircuitBreakerConfig::default());
        for _ in 0..4 {
            cb.record_failure(&network());
        }
        cb.record_success();
        for _ in 0..4 {
            cb.record_failure(&network());
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_non_health_errors_do_not_count() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let cb = CircuitBreaker::new("jina", config);
        cb.record_failure(&AppError::ValidationError("bad query".into()));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().last_error.as_deref(), Some("Validation error: bad query"));
    }

    #[test]
    fn test_single_probe_success_closes() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("browser", config);

        cb.record_failure(&network());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.allow().is_ok());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_reopens_on_failure() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("http", config);

        cb.record_failure(&network());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure(&network());
        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Open);
    }

    #[test]
    fn test_rate_limit_extends_recovery_timeout() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let cb = CircuitBreaker::new("brave", config);

        cb.record_failure(&AppError::RateLimitExceeded("429".into()));

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert!(stats.retry_after_secs.unwrap() > 55);
    }

    #[test]
    fn test_rate_limit_backoff_capped_at_max() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(200),
            ..Default::default()
        };
        let cb = CircuitBreaker::new("firecrawl", config);

        cb.record_failure(&AppError::RateLimitExceeded("quota".into()));

        let retry = cb.allow().unwrap_err();
        assert!(retry <= Duration::from_secs(300));
        assert!(retry > Duration::from_secs(290));
    }

    #[test]
    fn test_manual_reset() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let cb = CircuitBreaker::new("http", config);

        cb.record_failure(&network());
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().failure_count, 0);
    }
}
