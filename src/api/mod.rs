mod error;
mod session;
mod tokens;

use axum::Router;
use std::sync::Arc;

use crate::rate_limit::RateLimitConfig;
use crate::session::SessionService;

/// Create the API router.
pub fn create_api_router(
    service: Arc<SessionService>,
    secure_cookies: bool,
    expose_diagnostics: bool,
) -> Router {
    let rate_limits = Arc::new(RateLimitConfig::new());

    let tokens_state = tokens::TokensState {
        service: service.clone(),
        secure_cookies,
        expose_diagnostics,
    };

    let session_state = session::SessionState {
        service,
        expose_diagnostics,
    };

    Router::new()
        .nest("/tokens", tokens::router(tokens_state, rate_limits))
        .nest("/session", session::router(session_state))
}
