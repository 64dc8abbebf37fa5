//! Circuit breaker pattern for remediation targets.
//!
//! Prevents remediation storms by tracking recent failures per target and
//! temporarily blocking dispatch to targets that keep failing. Unlike a
//! consecutive-failure counter, the window is sliding: only failures
//! within the configured window count toward opening the circuit.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// State of one target's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Dispatch flows normally.
    Closed,

    /// Dispatch is blocked.
    Open,

    /// Probing whether the target has recovered.
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

/// Circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failures within `window` that open the circuit.
    pub failure_threshold: u32,

    /// Sliding window over which failures are counted.
    pub window: Duration,

    /// Time an open circuit waits before probing (half-open).
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(300),
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct TargetCircuit {
    state: CircuitState,
    failures: Vec<Instant>,
    opened_at: Option<Instant>,
}

impl TargetCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: Vec::new(),
            opened_at: None,
        }
    }

    fn prune(&mut self, window: Duration, now: Instant) {
        self.failures
            .retain(|t| now.duration_since(*t) < window);
    }
}

/// Per-target circuit breaker keyed by remediation target.
///
/// Transitions:
/// - closed → open when the window holds `failure_threshold` failures.
/// - open → half-open once `cooldown` has elapsed since opening.
/// - half-open → closed on one success, → open on one failure.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    circuits: DashMap<String, TargetCircuit>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuits: DashMap::new(),
        }
    }

    /// Whether dispatch to `target` is currently blocked.
    ///
    /// An open circuit whose cooldown has elapsed flips to half-open here
    /// and lets the probe request through.
    pub fn is_open(&self, target: &str) -> bool {
        let Some(mut circuit) = self.circuits.get_mut(target) else {
            return false;
        };
        if circuit.state == CircuitState::Open {
            let elapsed = circuit
                .opened_at
                .map(|t| t.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed >= self.config.cooldown {
                info!(target, "Circuit transitioning to half-open after cooldown");
                circuit.state = CircuitState::HalfOpen;
                return false;
            }
            return true;
        }
        false
    }

    /// Record a failed dispatch against `target`.
    pub fn record_failure(&self, target: &str) {
        let now = Instant::now();
        let mut circuit = self
            .circuits
            .entry(target.to_string())
            .or_insert_with(TargetCircuit::new);

        match circuit.state {
            CircuitState::Closed => {
                circuit.failures.push(now);
                circuit.prune(self.config.window, now);
                if circuit.failures.len() as u32 >= self.config.failure_threshold {
                    warn!(
                        target,
                        failures = circuit.failures.len(),
                        window_seconds = self.config.window.as_secs(),
                        "Circuit opening after repeated failures"
                    );
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(target, "Circuit re-opening after half-open failure");
                circuit.state = CircuitState::Open;
                circuit.opened_at = Some(now);
                circuit.failures.push(now);
            }
            CircuitState::Open => {
                // Already blocked; keep the window fresh.
                circuit.failures.push(now);
            }
        }
    }

    /// Record a successful dispatch against `target`.
    pub fn record_success(&self, target: &str) {
        let Some(mut circuit) = self.circuits.get_mut(target) else {
            return;
        };
        match circuit.state {
            CircuitState::HalfOpen => {
                info!(target, "Circuit closing after successful probe");
                circuit.state = CircuitState::Closed;
                circuit.failures.clear();
                circuit.opened_at = None;
            }
            CircuitState::Closed => {
                let now = Instant::now();
                circuit.prune(self.config.window, now);
            }
            CircuitState::Open => {
                debug!(target, "Success recorded while circuit open");
            }
        }
    }

    /// Current state for one target.
    pub fn state(&self, target: &str) -> CircuitState {
        self.circuits
            .get(target)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Snapshot of every tracked circuit.
    pub fn stats(&self) -> Vec<BreakerStats> {
        self.circuits
            .iter()
            .map(|entry| BreakerStats {
                target: entry.key().clone(),
                state: entry.value().state,
                recent_failures: entry.value().failures.len() as u32,
            })
            .collect()
    }
}

/// Observable state of one target circuit.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub target: String,
    pub state: CircuitState,
    pub recent_failures: u32,
}
