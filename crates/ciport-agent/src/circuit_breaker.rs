//! Circuit breaker for provider failures
//!
//! Each client owns one breaker. After `threshold` consecutive non-retryable
//! failures the breaker opens and calls fail fast until `cooldown` elapses;
//! then a single probe call is allowed through (half-open).

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls allowed
    Closed,
    /// Too many failures, calls rejected
    Open,
    /// Cooldown elapsed, next call probes recovery
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerInner {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Per-client circuit breaker
///
/// ```
/// use ciport_agent::CircuitBreaker;
///
/// let cb = CircuitBreaker::new(2, 60);
/// cb.record_failure();
/// cb.record_failure();
/// assert!(!cb.can_execute());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// * `threshold` - consecutive failures before the circuit opens
    /// * `cooldown_secs` - seconds before a probe call is allowed
    pub fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            inner: Mutex::new(BreakerInner::default()),
            threshold: threshold.max(1),
            cooldown: Duration::from_secs(cooldown_secs),
        }
    }

    pub fn state(&self) -> CircuitState {
        let Ok(inner) = self.inner.lock() else {
            return CircuitState::Closed;
        };

        if inner.consecutive_failures < self.threshold {
            return CircuitState::Closed;
        }

        match inner.last_failure {
            Some(at) if at.elapsed() < self.cooldown => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    pub fn record_success(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.consecutive_failures = 0;
            inner.last_failure = None;
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
            inner.last_failure = Some(Instant::now());
        }
    }

    /// Closed and half-open circuits accept calls
    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.inner
            .lock()
            .map(|inner| inner.consecutive_failures)
            .unwrap_or(0)
    }

    /// Remaining cooldown, zero unless the circuit is open
    pub fn time_until_retry(&self) -> Duration {
        if self.state() != CircuitState::Open {
            return Duration::ZERO;
        }
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.last_failure)
            .map(|at| self.cooldown.saturating_sub(at.elapsed()))
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        // 3 failures, 60 second cooldown
        Self::new(3, 60)
    }
}
