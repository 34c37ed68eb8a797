//! Circuit breaker registry for remote operations.
//!
//! Each logical operation key (resource family + action) owns an independent
//! breaker. After a configurable run of consecutive failures within a sliding
//! window the circuit opens and calls fail fast without touching the remote
//! API; after the cool-down exactly one half-open probe is admitted before
//! the state is re-evaluated.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::BreakerConfig;

/// State of a single circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are blocked until the cool-down elapses.
    Open,
    /// One probe request is admitted to test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Breaker state for one operation key.
#[derive(Debug, Clone)]
struct Circuit {
    state: CircuitState,
    /// Consecutive failures within the sliding window.
    consecutive_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    /// Whether the single half-open probe has been handed out.
    probe_in_flight: bool,
    open_count: u32,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            opened_at: None,
            probe_in_flight: false,
            open_count: 0,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Utc::now());
        self.probe_in_flight = false;
        self.open_count += 1;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.consecutive_failures = 0;
        self.last_failure_at = None;
        self.probe_in_flight = false;
    }

    fn record_failure(&mut self, config: &BreakerConfig) {
        let now = Utc::now();
        let window = ChronoDuration::milliseconds(config.failure_window_ms as i64);

        match self.state {
            CircuitState::HalfOpen => {
                // A failed probe restarts the cool-down.
                self.open();
            }
            CircuitState::Closed => {
                // A failure outside the window starts a fresh run.
                if self
                    .last_failure_at
                    .is_some_and(|last| now - last > window)
                {
                    self.consecutive_failures = 0;
                }
                self.consecutive_failures += 1;
                self.last_failure_at = Some(now);
                if self.consecutive_failures >= config.failure_threshold {
                    self.open();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_success(&mut self) {
        match self.state {
            CircuitState::HalfOpen => self.close(),
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.last_failure_at = None;
            }
            CircuitState::Open => {}
        }
    }

    /// Remaining cool-down in milliseconds, zero once elapsed.
    fn remaining_cooldown_ms(&self, config: &BreakerConfig) -> u64 {
        let Some(opened_at) = self.opened_at else {
            return 0;
        };
        let elapsed = (Utc::now() - opened_at).num_milliseconds().max(0) as u64;
        config.cooldown_ms.saturating_sub(elapsed)
    }
}

/// Decision handed back by [`CircuitBreakerRegistry::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Call may proceed normally.
    Allowed,
    /// Call is the single half-open probe.
    Probe,
}

/// Point-in-time view of one circuit, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub operation: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub open_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

/// Registry of per-operation-key circuit breakers.
///
/// Transition ownership belongs solely to this registry; callers only ever
/// see admission decisions and `CircuitOpen` errors.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    circuits: Arc<RwLock<HashMap<String, Circuit>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Ask whether a call for `operation` may proceed.
    ///
    /// While open, returns `CircuitOpen` carrying the remaining cool-down.
    /// After the cool-down the circuit moves to half-open and exactly one
    /// caller receives the probe admission; concurrent callers keep failing
    /// fast until the probe settles.
    pub async fn admit(&self, operation: &str) -> OrchestratorResult<Admission> {
        if !self.config.enabled {
            return Ok(Admission::Allowed);
        }

        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(operation.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => Ok(Admission::Allowed),
            CircuitState::Open => {
                let remaining = circuit.remaining_cooldown_ms(&self.config);
                if remaining > 0 {
                    return Err(OrchestratorError::CircuitOpen {
                        operation: operation.to_string(),
                        retry_in_ms: remaining,
                    });
                }
                debug!(operation, "circuit cool-down elapsed, admitting probe");
                circuit.state = CircuitState::HalfOpen;
                circuit.probe_in_flight = true;
                Ok(Admission::Probe)
            }
            CircuitState::HalfOpen => {
                if circuit.probe_in_flight {
                    Err(OrchestratorError::CircuitOpen {
                        operation: operation.to_string(),
                        retry_in_ms: 0,
                    })
                } else {
                    circuit.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    /// Record the outcome of an admitted call.
    pub async fn record(&self, operation: &str, success: bool) {
        if !self.config.enabled {
            return;
        }

        let mut circuits = self.circuits.write().await;
        let circuit = circuits
            .entry(operation.to_string())
            .or_insert_with(Circuit::new);

        let was_closed = circuit.state == CircuitState::Closed;
        if success {
            circuit.record_success();
        } else {
            circuit.record_failure(&self.config);
            if was_closed && circuit.state == CircuitState::Open {
                warn!(
                    operation,
                    failures = circuit.consecutive_failures,
                    cooldown_ms = self.config.cooldown_ms,
                    "circuit opened"
                );
            }
        }
    }

    /// Guard a remote call with the breaker for `operation`.
    pub async fn guard<F, T>(&self, operation: &str, call: F) -> OrchestratorResult<T>
    where
        F: std::future::Future<Output = OrchestratorResult<T>>,
    {
        self.admit(operation).await?;
        match call.await {
            Ok(value) => {
                self.record(operation, true).await;
                Ok(value)
            }
            Err(err) => {
                self.record(operation, false).await;
                Err(err)
            }
        }
    }

    /// Current state of one circuit, if it exists.
    pub async fn state(&self, operation: &str) -> Option<CircuitState> {
        let circuits = self.circuits.read().await;
        circuits.get(operation).map(|c| c.state)
    }

    /// Snapshot of every circuit.
    pub async fn stats(&self) -> Vec<CircuitStats> {
        let circuits = self.circuits.read().await;
        circuits
            .iter()
            .map(|(op, c)| CircuitStats {
                operation: op.clone(),
                state: c.state,
                consecutive_failures: c.consecutive_failures,
                open_count: c.open_count,
                opened_at: c.opened_at,
            })
            .collect()
    }

    /// Manually reset one circuit.
    pub async fn reset(&self, operation: &str) {
        let mut circuits = self.circuits.write().await;
        if let Some(circuit) = circuits.get_mut(operation) {
            circuit.close();
            circuit.open_count = 0;
        }
    }
}
