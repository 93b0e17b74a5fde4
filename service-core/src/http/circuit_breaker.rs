use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before letting a probe through.
    pub open_cooldown: Duration,
    /// How long a half-open probe may run before another one is admitted.
    pub half_open_probe_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            open_cooldown: Duration::from_secs(120),
            half_open_probe_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Error, Clone)]
#[error("circuit breaker {0} is open")]
pub struct CircuitOpen(pub String);

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_started_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker, one per downstream.
///
/// Callers ask [`CircuitBreaker::acquire`] before a call and report the
/// outcome with [`CircuitBreaker::on_success`] or [`CircuitBreaker::on_failure`].
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_started_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Admit a call, or fail fast while the breaker is open.
    pub async fn acquire(&self) -> Result<(), CircuitOpen> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        match state.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let cooled_down = state
                    .opened_at
                    .map_or(true, |t| now.duration_since(t) >= self.config.open_cooldown);
                if cooled_down {
                    info!(breaker = %self.name, "circuit breaker half-open, admitting probe");
                    state.state = CircuitState::HalfOpen;
                    state.probe_started_at = Some(now);
                    Ok(())
                } else {
                    Err(CircuitOpen(self.name.clone()))
                }
            }
            CircuitState::HalfOpen => {
                let probe_running = state.probe_started_at.is_some_and(|t| {
                    now.duration_since(t) < self.config.half_open_probe_timeout
                });
                if probe_running {
                    Err(CircuitOpen(self.name.clone()))
                } else {
                    state.probe_started_at = Some(now);
                    Ok(())
                }
            }
        }
    }

    pub async fn on_success(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::HalfOpen => {
                info!(breaker = %self.name, "circuit breaker closed after successful probe");
                state.state = CircuitState::Closed;
                state.consecutive_failures = 0;
                state.opened_at = None;
                state.probe_started_at = None;
            }
            CircuitState::Closed => state.consecutive_failures = 0,
            // late result of a call admitted before the breaker tripped
            CircuitState::Open => {}
        }
    }

    pub async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = state.consecutive_failures,
                        "circuit breaker tripped, failing fast"
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "probe failed, circuit breaker open again");
                state.state = CircuitState::Open;
                state.opened_at = Some(now);
                state.probe_started_at = None;
            }
            CircuitState::Open => {}
        }
    }
}
