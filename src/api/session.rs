//! Aggregated "current session" endpoint.
//!
//! Backs the client's single session read with the snapshot cache, so the
//! common case is one in-memory lookup instead of three ground-truth reads.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{Auth, HasAuthState};
use crate::jwt::JwtConfig;
use crate::session::SessionService;

#[derive(Clone)]
pub struct SessionState {
    pub service: Arc<SessionService>,
    pub expose_diagnostics: bool,
}

impl HasAuthState for SessionState {
    fn jwt(&self) -> &JwtConfig {
        self.service.jwt()
    }

    fn expose_diagnostics(&self) -> bool {
        self.expose_diagnostics
    }
}

pub fn router(state: SessionState) -> Router {
    Router::new().route("/", get(get_session)).with_state(state)
}

/// Current session snapshot for the authenticated user.
async fn get_session(
    State(state): State<SessionState>,
    Auth(principal): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state
        .service
        .get_session_snapshot(principal.uuid())
        .await
        .map_err(|e| ApiError::from_session_error(e, state.expose_diagnostics))?;

    Ok((StatusCode::OK, Json(snapshot)))
}
