use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::config::ClassifierConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Classifier calls pass through
    Closed,
    /// Classifier calls fail fast
    Open,
    /// One probe at a time decides whether to close again
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed sub-batches before opening
    pub failure_threshold: usize,
    /// How long the circuit stays open before probing
    pub reset_timeout: Duration,
    /// Consecutive half-open successes needed to close
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

impl From<&ClassifierConfig> for CircuitBreakerConfig {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            failure_threshold: config.circuit_failure_threshold.max(1),
            reset_timeout: Duration::from_secs(config.circuit_reset_seconds),
            success_threshold: 1,
        }
    }
}

/// Guards the toxicity classifier so a dead inference backend costs one
/// fast 0.0 per sub-batch instead of a full request timeout.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<RwLock<BreakerInner>>,
    config: CircuitBreakerConfig,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: usize,
    consecutive_successes: usize,
    opened_at: Option<Instant>,
    trips: usize,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                trips: 0,
            })),
            config,
        }
    }

    /// Whether a classifier call may proceed
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match inner.opened_at {
                Some(opened) if opened.elapsed() >= self.config.reset_timeout => {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    true
                }
                _ => false,
            },
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.consecutive_failures = 0;

        if inner.state != CircuitState::Closed {
            inner.consecutive_successes += 1;
            if inner.consecutive_successes >= self.config.success_threshold {
                inner.state = CircuitState::Closed;
                inner.consecutive_successes = 0;
                inner.opened_at = None;
            }
        }
    }

    /// Record a failed call. Returns true when this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.inner.write();
        inner.consecutive_successes = 0;
        inner.consecutive_failures += 1;

        let trip = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if trip {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.trips += 1;
        }
        trip
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    pub fn trips(&self) -> usize {
        self.inner.read().trips
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
