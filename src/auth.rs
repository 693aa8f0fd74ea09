//! Access token authentication for API routes.
//!
//! Uses a dual-token system:
//! - Access tokens: short-lived (15 min), stateless, no database check
//! - Refresh tokens: long-lived (7 days), tracked in the session store
//!
//! Access token checks are deliberately pure CPU work: signature, expiry,
//! issuer/audience, and type. They are NOT checked against the session
//! store, so a revoked user's unexpired access token keeps working until
//! its natural expiry (at most 15 minutes). That staleness window is the
//! price of keeping every authenticated request free of store I/O; callers
//! needing immediate revocation must go through the refresh path.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::db::DeviceMeta;
use crate::jwt::{AccessClaims, JwtConfig, JwtError};

/// Cookie name for the access token (short-lived, 15 minutes).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh token (long-lived, 7 days).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Extract a bearer token from the Authorization header.
pub fn get_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::trim)
}

/// Authenticated principal extracted from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    /// JWT claims from the access token
    pub claims: AccessClaims,
}

impl AuthenticatedPrincipal {
    pub fn uuid(&self) -> &str {
        &self.claims.sub
    }
}

/// Authentication failure. Every reason maps to the same generic 401 so
/// the response gives no oracle for distinguishing expired, forged, or
/// wrong-type credentials; the precise reason goes to the log. With
/// diagnostics enabled (never in production) a coarse reason is appended.
#[derive(Debug)]
pub struct AuthError {
    reason: &'static str,
    expose_reason: bool,
}

impl AuthError {
    pub fn new(reason: &'static str, expose_reason: bool) -> Self {
        Self {
            reason,
            expose_reason,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        use axum::Json;
        use axum::http::StatusCode;

        let error = if self.expose_reason {
            format!("Authentication failed: {}", self.reason)
        } else {
            "Authentication failed".to_string()
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": error })),
        )
            .into_response()
    }
}

/// Trait for state types that support access token authentication.
pub trait HasAuthState {
    fn jwt(&self) -> &JwtConfig;
    fn expose_diagnostics(&self) -> bool;
}

/// Extractor for API endpoints that require authentication.
///
/// Reads the access token from the `access_token` cookie, falling back to
/// an `Authorization: Bearer` header, and verifies it statelessly.
pub struct Auth(pub AuthenticatedPrincipal);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let expose = state.expose_diagnostics();

        let token = get_cookie(&parts.headers, ACCESS_COOKIE_NAME)
            .or_else(|| get_bearer_token(&parts.headers))
            .ok_or(AuthError::new("no access credential", expose))?;

        let claims = state.jwt().validate_access_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            match e {
                JwtError::Malformed(_) => AuthError::new("malformed credential", expose),
                JwtError::WrongTokenType => AuthError::new("wrong credential type", expose),
                _ => AuthError::new("invalid or expired credential", expose),
            }
        })?;

        Ok(Auth(AuthenticatedPrincipal { claims }))
    }
}

/// Extract client IP address from headers or connection info.
/// Checks X-Forwarded-For first (for reverse proxy), then falls back to
/// the connection's peer address.
pub fn extract_client_ip(headers: &HeaderMap, parts: &Parts) -> Option<String> {
    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            // X-Forwarded-For can contain multiple IPs, take the first (original client)
            if let Some(first_ip) = value.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

/// Assemble the device metadata recorded on a new session.
pub fn device_meta_from_parts(parts: &Parts) -> DeviceMeta {
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    DeviceMeta {
        device_name: parts
            .headers
            .get("x-device-name")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        ip_address: extract_client_ip(&parts.headers, parts),
        user_agent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_get_cookie_simple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("access_token=abc123"),
        );

        assert_eq!(get_cookie(&headers, "access_token"), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; access_token=abc123; refresh_token=xyz789"),
        );

        assert_eq!(get_cookie(&headers, "access_token"), Some("abc123"));
        assert_eq!(get_cookie(&headers, "refresh_token"), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_not_found() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));

        assert_eq!(get_cookie(&headers, "access_token"), None);
    }

    #[test]
    fn test_get_cookie_no_header() {
        let headers = HeaderMap::new();
        assert_eq!(get_cookie(&headers, "access_token"), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  access_token = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, "access_token"), Some("abc123"));
    }

    #[test]
    fn test_device_meta_from_parts() {
        let request = axum::http::Request::builder()
            .header("x-device-name", "iPhone 15")
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .header(header::USER_AGENT, "Safari/17.0")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();

        let meta = device_meta_from_parts(&parts);
        assert_eq!(meta.device_name.as_deref(), Some("iPhone 15"));
        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(meta.user_agent.as_deref(), Some("Safari/17.0"));
    }

    #[test]
    fn test_get_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );

        assert_eq!(get_bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn test_get_bearer_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );

        assert_eq!(get_bearer_token(&headers), None);
    }
}
