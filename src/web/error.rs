//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::RelayError;

/// API error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Bad request (400).
    BadRequest,
    /// Not found (404).
    NotFound,
    /// Conflict (409).
    Conflict,
    /// Internal server error (500).
    InternalError,
    /// Service unavailable (503).
    Unavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Classify a relay error.
    pub fn of(err: &RelayError) -> Self {
        match err {
            RelayError::ProtocolUpgrade(_) | RelayError::Frame(_) => ErrorCode::BadRequest,
            RelayError::UnknownConnection(_) => ErrorCode::NotFound,
            RelayError::AlreadyRegistered(_) => ErrorCode::Conflict,
            RelayError::TooManyConnections => ErrorCode::Unavailable,
            RelayError::SendFailure { .. } | RelayError::Io(_) | RelayError::Config(_) => {
                ErrorCode::InternalError
            }
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Error detail.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let code = ErrorCode::of(&self);
        let message = if code == ErrorCode::InternalError {
            tracing::error!("Internal error: {}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (code.status_code(), Json(body)).into_response()
    }
}
