//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type. Dispatcher and relay
//! operations return it as a value; the REST layer turns it into a
//! structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 3001,
///     "message": "access denied",
///     "details": "device mbed is locked"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Relay error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status               |
/// |-----------|-----------------|---------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request           |
/// | 2000–2999 | Not Found       | 404 Not Found             |
/// | 3000–3999 | Authorization   | 403 Forbidden             |
/// | 5000–5999 | Server/Outbound | 500 / 502                 |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No device is registered under the given id.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device exists but has no action with this name.
    #[error("action not found: {action} on device {device}")]
    ActionNotFound {
        /// Device id.
        device: String,
        /// Requested action name.
        action: String,
    },

    /// The device is locked.
    #[error("access denied")]
    AccessDenied {
        /// Device whose permission flag is `false`.
        device: String,
    },

    /// The outbound device-API call failed or timed out.
    #[error("outbound call failed: {0}")]
    OutboundCallFailed(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::DeviceNotFound(_) => 2001,
            Self::ActionNotFound { .. } => 2002,
            Self::AccessDenied { .. } => 3001,
            Self::Internal(_) => 5000,
            Self::OutboundCallFailed(_) => 5001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::DeviceNotFound(_) | Self::ActionNotFound { .. } => StatusCode::NOT_FOUND,
            Self::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Self::OutboundCallFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::AccessDenied { device } => Some(format!("device {device} is locked")),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::OutboundCallFailed("request timed out".to_string())
        } else if let Some(status) = err.status() {
            Self::OutboundCallFailed(format!("device API answered {status}"))
        } else {
            Self::OutboundCallFailed(err.to_string())
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
