//! Error types for the event service.
//!
//! [`EventServiceError`] is the server-side error type. Each variant maps
//! to a numeric error code and an HTTP status so it can be returned
//! straight from an Axum handler. [`RemoteCallError`] is what the client
//! side sees when a register/unlisten/listen/filter call fails.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::UserId;

/// Numeric code the server uses for [`EventServiceError::UninitializedClient`].
pub const UNINITIALIZED_CLIENT_CODE: u32 = 2001;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "uninitialized client: 7c0e...",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status               |
/// |-----------|-----------------|---------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request           |
/// | 2000–2999 | State/Not Found | 404 Not Found             |
/// | 3000–3999 | Server          | 500 Internal Server Error |
#[derive(Debug, thiserror::Error)]
pub enum EventServiceError {
    /// Waiting times or other settings are invalid. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `listen` was called for a user with no registration.
    #[error("uninitialized client: {0}")]
    UninitializedClient(UserId),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EventServiceError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::UninitializedClient(_) => UNINITIALIZED_CLIENT_CODE,
            Self::Internal(_) => 3000,
            Self::Configuration(_) => 3001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UninitializedClient(_) => StatusCode::NOT_FOUND,
            Self::Configuration(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EventServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Failure of a single remote call issued by the client.
///
/// Cloneable so one registration outcome can be handed to every listener
/// that joined the same in-flight registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteCallError {
    /// The server has no registration for this client (never registered,
    /// or evicted after the idle timeout).
    #[error("client is not initialized on the server")]
    Uninitialized,

    /// The call never produced a server answer.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with an error.
    #[error("remote call rejected ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the server.
        status: u16,
        /// Server-supplied error message.
        message: String,
    },
}

impl From<reqwest::Error> for RemoteCallError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
