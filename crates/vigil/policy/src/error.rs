//! Error types for policy management.

use thiserror::Error;
use vigil_types::ValidationError;

/// Errors surfaced by the registry and engine.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy with this name is already registered.
    #[error("policy '{0}' already exists")]
    AlreadyExists(String),

    /// No policy with this name is registered.
    #[error("policy '{0}' not found")]
    NotFound(String),

    /// A policy failed structural validation.
    #[error("invalid policy '{name}': {source}")]
    Invalid {
        name: String,
        #[source]
        source: ValidationError,
    },

    /// A reload source could not be parsed or validated. The registry is
    /// unchanged; `offending` names every rejected policy.
    #[error("policy reload rejected: {detail}")]
    ReloadRejected {
        detail: String,
        offending: Vec<String>,
    },
}

/// Result type alias for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
