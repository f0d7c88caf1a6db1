//! Circuit breaker shielding callers from a failing dependency
//!
//! One breaker per protected resource, constructed once per worker process
//! and injected wherever that resource is called.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Circuit tripped - calls fail immediately
    Open,
    /// Testing recovery - a single trial call is let through
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the circuit
    pub failure_threshold: u32,
    /// Time to wait since the last failure before a trial call
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Thread-safe circuit breaker keyed by resource name
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the named resource
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
            }),
        }
    }

    /// Get the resource name this breaker protects
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state without promoting it
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get the current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Execute the wrapped operation with circuit breaker protection
    ///
    /// While open, the operation is not invoked at all.
    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(CircuitError::Open);
        }

        match f.await {
            Ok(result) => {
                self.on_success();
                Ok(result)
            }
            Err(e) => {
                self.on_failure();
                Err(CircuitError::Failed(e))
            }
        }
    }

    /// Decide whether a call may proceed, promoting Open to HalfOpen after
    /// the timeout has elapsed since the last failure.
    fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.timeout {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(circuit = %self.name, "circuit entering half-open state");
                    true
                } else {
                    false
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            tracing::info!(circuit = %self.name, "circuit recovered, closing");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(
                        circuit = %self.name,
                        failures = inner.failure_count,
                        "circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                tracing::warn!(circuit = %self.name, "trial call failed, circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }
}

/// Circuit breaker error
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    #[error("circuit is open - call rejected")]
    Open,
    #[error("call failed: {0}")]
    Failed(#[source] E),
}
