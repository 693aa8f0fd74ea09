//! Token and session management API endpoints.
//!
//! - POST `/refresh` - Exchange refresh token for new access token
//! - POST `/logout` - Revoke the presented session and clear cookies
//! - POST `/logout-all` - Revoke every session for the caller
//! - GET `/` - List active sessions for the current user
//! - GET `/verify` - Lightweight access token probe

use axum::{
    Json, Router, middleware,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{ACCESS_COOKIE_NAME, Auth, HasAuthState, REFRESH_COOKIE_NAME, get_cookie};
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_token_refresh};
use crate::session::SessionService;

#[derive(Clone)]
pub struct TokensState {
    pub service: Arc<SessionService>,
    pub secure_cookies: bool,
    pub expose_diagnostics: bool,
}

impl HasAuthState for TokensState {
    fn jwt(&self) -> &JwtConfig {
        self.service.jwt()
    }

    fn expose_diagnostics(&self) -> bool {
        self.expose_diagnostics
    }
}

pub fn router(state: TokensState, rate_limits: Arc<RateLimitConfig>) -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/verify", get(verify_token))
        .route(
            "/refresh",
            post(refresh_token).layer(middleware::from_fn_with_state(
                rate_limits,
                rate_limit_token_refresh,
            )),
        )
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .with_state(state)
}

fn build_cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        name, value, max_age, secure
    )
}

fn clear_cookie(name: &str, secure: bool) -> String {
    build_cookie(name, "", 0, secure)
}

/// Verify that the current access token is still valid.
/// Returns 200 if valid, 401 if not. Purely stateless.
async fn verify_token(Auth(_principal): Auth) -> impl IntoResponse {
    StatusCode::OK
}

/// Refresh the access token using a valid refresh token.
/// The refresh token must pass stateless checks and have a matching active
/// session. Returns a new access token cookie.
async fn refresh_token(
    State(state): State<TokensState>,
    request: axum::extract::Request,
) -> Result<impl IntoResponse, ApiError> {
    let (parts, _body) = request.into_parts();

    let refresh_token = get_cookie(&parts.headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiError::auth_failed(state.expose_diagnostics, "no refresh token"))?;

    let access = state
        .service
        .refresh_access(refresh_token)
        .await
        .map_err(|e| ApiError::from_session_error(e, state.expose_diagnostics))?;

    let access_cookie = build_cookie(
        ACCESS_COOKIE_NAME,
        &access.token,
        access.duration,
        state.secure_cookies,
    );

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, access_cookie)],
        Json(serde_json::json!({ "success": true })),
    ))
}

/// Logout - revoke the presented session and clear both cookies.
/// Succeeds even without a valid token: revocation is idempotent.
async fn logout(
    State(state): State<TokensState>,
    request: axum::extract::Request,
) -> Result<impl IntoResponse, ApiError> {
    let (parts, _body) = request.into_parts();

    if let Some(refresh_token) = get_cookie(&parts.headers, REFRESH_COOKIE_NAME) {
        if let Err(e) = state.service.revoke_session(refresh_token).await {
            tracing::warn!(error = %e, "Failed to revoke session on logout");
        }
    }

    Ok((
        StatusCode::OK,
        AppendHeaders([
            (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME, state.secure_cookies)),
            (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME, state.secure_cookies)),
        ]),
        Json(serde_json::json!({ "success": true })),
    ))
}

#[derive(Serialize)]
struct LogoutAllResponse {
    revoked: u64,
}

/// Logout everywhere - revoke every active session for the caller.
/// Returns the number of sessions revoked and clears this client's cookies.
async fn logout_all(
    State(state): State<TokensState>,
    Auth(principal): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state
        .service
        .revoke_all_sessions(principal.uuid())
        .await
        .map_err(|e| ApiError::from_session_error(e, state.expose_diagnostics))?;

    Ok((
        StatusCode::OK,
        AppendHeaders([
            (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME, state.secure_cookies)),
            (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME, state.secure_cookies)),
        ]),
        Json(LogoutAllResponse { revoked }),
    ))
}

#[derive(Serialize)]
struct SessionInfo {
    device_name: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: String,
    last_used: String,
    expires_at: String,
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

/// List active sessions for the current user. Token hashes are not
/// exposed; clients identify sessions by device metadata.
async fn list_sessions(
    State(state): State<TokensState>,
    Auth(principal): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state
        .service
        .list_sessions(principal.uuid())
        .await
        .map_err(|e| ApiError::from_session_error(e, state.expose_diagnostics))?;

    let sessions = sessions
        .into_iter()
        .map(|s| SessionInfo {
            device_name: s.device_name,
            ip_address: s.ip_address,
            user_agent: s.user_agent,
            created_at: s.created_at,
            last_used: s.last_used,
            expires_at: s.expires_at,
        })
        .collect();

    Ok((StatusCode::OK, Json(ListSessionsResponse { sessions })))
}
