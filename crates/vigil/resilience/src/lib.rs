//! Resilience primitives for the Vigil control plane.
//!
//! Currently one: a per-target circuit breaker that suppresses
//! remediation against targets that keep failing.

mod breaker;

pub use breaker::{BreakerConfig, BreakerStats, CircuitBreaker, CircuitState};
