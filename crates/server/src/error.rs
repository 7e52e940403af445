//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tfmirror_storage::StorageError;

/// JSON body for every failure response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Upstream HTTP status line, echoed when one was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Short error text for 5xx responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Upstream registry unreachable or responded non-2xx.
    #[error("{message}")]
    BadGateway {
        message: String,
        status: Option<String>,
    },

    /// Internal fault; `details` carries the short error text.
    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            details: None,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::BadGateway { message, status } => ErrorResponse {
                error: message,
                status,
                details: None,
            },
            Self::Internal { message, details } => ErrorResponse {
                error: message,
                status: None,
                details,
            },
            Self::Storage(e) => ErrorResponse {
                error: "failed to get file from cache".to_string(),
                status: None,
                details: Some(e.to_string()),
            },
            other => ErrorResponse {
                error: other.to_string(),
                status: None,
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadGateway {
                message: "x".into(),
                status: None
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_body_omits_empty_fields() {
        let body = ErrorResponse {
            error: "invalid parameters".to_string(),
            status: None,
            details: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, "{\"error\":\"invalid parameters\"}");
    }
}
