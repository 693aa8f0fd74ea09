//! Rate limiting for token endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to keep refresh
//! traffic from being used to probe for valid stolen tokens.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::net::SocketAddr;
use std::{num::NonZeroU32, sync::Arc};

/// Per-IP rate limiter for endpoint-specific limiting.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for token endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for the token refresh endpoint
    pub token_refresh: Arc<IpLimiter>,
}

impl RateLimitConfig {
    /// Create rate limiters with default configuration.
    pub fn new() -> Self {
        // Refresh: 5 per second with a burst of 20 per IP. Legitimate
        // clients refresh once per access token lifetime; this only bites
        // token-guessing loops.
        Self {
            token_refresh: Arc::new(RateLimiter::keyed(
                Quota::per_second(NonZeroU32::new(5).unwrap())
                    .allow_burst(NonZeroU32::new(20).unwrap()),
            )),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn client_ip(request: &Request) -> Option<String> {
    if let Some(forwarded_for) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            if let Some(first_ip) = value.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

/// Middleware for rate limiting the token refresh endpoint.
pub async fn rate_limit_token_refresh(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    // Unknown IPs share one bucket rather than bypassing the limit
    let ip = client_ip(&request).unwrap_or_else(|| "unknown".to_string());

    match config.token_refresh.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please try again later.",
        )
            .into_response(),
    }
}
