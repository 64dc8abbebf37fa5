//! Validation errors shared across the data model.

use thiserror::Error;

/// Error raised when a value fails structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required string field was empty.
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    /// A string field exceeded its maximum length.
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// A numeric field was NaN or infinite.
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },

    /// A condition tree nested deeper than the supported bound.
    #[error("condition tree exceeds maximum depth of {max}")]
    TooDeep { max: usize },

    /// An enumerated field held an unrecognized value.
    #[error("unrecognized {field}: {value}")]
    Unrecognized { field: &'static str, value: String },

    /// A target pattern used an unsupported glob form.
    #[error("invalid target pattern: {pattern}")]
    BadPattern { pattern: String },
}
