//! Error types for the daemon.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vigil_policy::PolicyError;
use vigil_queue::QueueError;
use vigil_storage::StorageError;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Server startup error.
    #[error("server error: {0}")]
    Server(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// API-surface errors. Serialized as `{"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Malformed request.
    #[error("{0}")]
    BadRequest(String),

    /// Request is well-formed but semantically invalid.
    #[error("{0}")]
    Unprocessable(String),

    /// Duplicate name or state-transition race.
    #[error("{0}")]
    Conflict(String),

    /// Unexpected failure.
    #[error("{0}")]
    Internal(String),
}

/// Error body contract: a stable `detail` string, nothing else.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(detail) => ApiError::NotFound(detail),
            StorageError::Conflict(detail) => ApiError::Conflict(detail),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::NotFound(name) => ApiError::NotFound(format!("policy '{name}' not found")),
            PolicyError::AlreadyExists(name) => {
                ApiError::Conflict(format!("policy '{name}' already exists"))
            }
            PolicyError::Invalid { .. } => ApiError::BadRequest(err.to_string()),
            PolicyError::ReloadRejected { .. } => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::NotFound("x".to_string()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("x".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unprocessable("x".to_string())
                .into_response()
                .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Conflict("x".to_string()).into_response().status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_storage_error_mapping() {
        let err: ApiError = StorageError::NotFound("action 9".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError = StorageError::Conflict("raced".to_string()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_policy_error_mapping() {
        let err: ApiError = PolicyError::NotFound("p".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError = PolicyError::AlreadyExists("p".to_string()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
