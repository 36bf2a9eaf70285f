use tracing::{error, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed, // Normal operation - keep cycling
    Open,   // Failure threshold reached - stop
}

/// Consecutive-failure circuit breaker.
///
/// Any success resets the count. Once `failure_threshold` failures happen
/// in a row the circuit opens and stays open; the owner is expected to stop.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: usize,
    consecutive_failures: usize,
    state: CircuitState,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    ///
    /// # Arguments
    /// * `name` - Identifier for logging
    /// * `failure_threshold` - Consecutive failures before opening (at least 1)
    pub fn new(name: impl Into<String>, failure_threshold: usize) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            consecutive_failures: 0,
            state: CircuitState::Closed,
        }
    }

    /// Record a successful cycle
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures > 0 {
                    info!(
                        "CircuitBreaker [{}]: recovered after {} failures",
                        self.name, self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
            }
            CircuitState::Open => {
                warn!(
                    "CircuitBreaker [{}]: Success recorded in Open state (ignored)",
                    self.name
                );
            }
        }
    }

    /// Record a failed cycle and return the resulting state
    pub fn record_failure(&mut self) -> CircuitState {
        self.consecutive_failures += 1;

        if self.state == CircuitState::Closed {
            warn!(
                "CircuitBreaker [{}]: consecutive failures: {}",
                self.name, self.consecutive_failures
            );
            if self.consecutive_failures >= self.failure_threshold {
                error!(
                    "CircuitBreaker [{}]: Transitioning Closed -> Open ({} failures)",
                    self.name, self.consecutive_failures
                );
                self.state = CircuitState::Open;
            }
        }

        self.state
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }
}
