//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::session::SessionError;

/// API error type with automatic response conversion.
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Generic authentication failure. Every rejection reason produces the
    /// same response body so callers cannot distinguish expired from forged
    /// from revoked credentials; `reason` is appended only when diagnostics
    /// are enabled (never in production).
    pub fn auth_failed(expose_diagnostics: bool, reason: &str) -> Self {
        if expose_diagnostics {
            Self::Unauthorized(format!("Authentication failed: {}", reason))
        } else {
            Self::Unauthorized("Authentication failed".to_string())
        }
    }

    /// Map a session service failure to its external response, logging the
    /// detailed reason internally.
    pub fn from_session_error(e: SessionError, expose_diagnostics: bool) -> Self {
        match &e {
            SessionError::Token(_)
            | SessionError::SessionNotFound
            | SessionError::PrincipalNotFound
            | SessionError::PrincipalDisabled => {
                warn!(reason = %e, "Authentication rejected");
                Self::auth_failed(expose_diagnostics, &e.to_string())
            }
            // Store failure during validation fails closed
            SessionError::Store(_) => {
                error!(error = %e, "Session store unavailable");
                Self::auth_failed(expose_diagnostics, "session store unavailable")
            }
            SessionError::SnapshotUnavailable(_) => {
                error!(error = %e, "Session snapshot unavailable");
                Self::Unavailable("Session data temporarily unavailable".to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
