#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use nestlock::api::create_api_router;
use nestlock::cache::{CacheConfig, SnapshotStore, build_snapshot_store};
use nestlock::db::{Database, DeviceMeta, UserRole};
use nestlock::jwt::JwtConfig;
use nestlock::session::{SessionService, TokenPair};
use std::sync::Arc;

pub const TEST_JWT_SECRET: &[u8] = b"test-jwt-secret-for-nestlock-tests";

/// Everything a test needs: the HTTP surface, the backing database, the
/// service, and a handle on the snapshot store for seeding/inspection.
pub struct TestContext {
    pub app: Router,
    pub db: Database,
    pub service: Arc<SessionService>,
    pub store: Arc<dyn SnapshotStore>,
    pub jwt: JwtConfig,
}

pub fn test_cache_config() -> CacheConfig {
    CacheConfig {
        ttl_seconds: 30,
        refresh_lead_seconds: 5,
        // Generous bound: tests care about behavior, not latency targets
        rebuild_timeout_ms: 5_000,
        redis_url: String::new(),
    }
}

pub async fn setup() -> TestContext {
    setup_with_cache(test_cache_config()).await
}

pub async fn setup_with_cache(cache: CacheConfig) -> TestContext {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");

    let jwt = Arc::new(JwtConfig::new(TEST_JWT_SECRET));
    let store = build_snapshot_store(&cache).expect("Failed to build snapshot store");
    let service = Arc::new(SessionService::new(
        db.clone(),
        jwt.clone(),
        store.clone(),
        cache,
    ));

    let app = Router::new().nest("/api", create_api_router(service.clone(), false, false));

    TestContext {
        app,
        db,
        service,
        store,
        jwt: JwtConfig::new(TEST_JWT_SECRET),
    }
}

/// Create an active user and return their UUID.
pub async fn create_user(db: &Database, email: &str, role: UserRole) -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    db.users()
        .create(&uuid, email, "Test User", role)
        .await
        .expect("Failed to create user");
    uuid
}

/// Issue a token pair for a user, as a login flow would.
pub async fn login(service: &SessionService, uuid: &str) -> TokenPair {
    service
        .issue_token_pair(uuid, &DeviceMeta::default())
        .await
        .expect("Failed to issue token pair")
}

/// Issue a token pair with device metadata.
pub async fn login_with_device(
    service: &SessionService,
    uuid: &str,
    device_name: &str,
    ip: &str,
) -> TokenPair {
    let device = DeviceMeta {
        device_name: Some(device_name.to_string()),
        ip_address: Some(ip.to_string()),
        user_agent: Some("test-agent".to_string()),
    };
    service
        .issue_token_pair(uuid, &device)
        .await
        .expect("Failed to issue token pair")
}

pub fn auth_cookies(access_token: &str, refresh_token: &str) -> String {
    format!(
        "access_token={}; refresh_token={}",
        access_token, refresh_token
    )
}

pub fn refresh_cookie_only(refresh_token: &str) -> String {
    format!("refresh_token={}", refresh_token)
}

pub fn access_cookie_only(access_token: &str) -> String {
    format!("access_token={}", access_token)
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &axum::http::Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.contains(cookie_name) && c.contains("Max-Age=0"))
}

/// Check if cookies contain a new access token
pub fn has_new_access_token(cookies: &[String]) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with("access_token=") && !c.contains("Max-Age=0"))
}

/// Pull the access token value out of a Set-Cookie header list.
pub fn extract_access_token(cookies: &[String]) -> Option<String> {
    cookies
        .iter()
        .find(|c| c.starts_with("access_token=") && !c.contains("Max-Age=0"))
        .and_then(|c| c.split(';').next())
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
}

/// Parse a JSON response body.
pub async fn response_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&body).expect("Body is not valid JSON")
}
