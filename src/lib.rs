pub mod api;
pub mod auth;
pub mod cache;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod permissions;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use axum::Router;
use cache::{CacheConfig, build_snapshot_store};
use db::Database;
use jwt::JwtConfig;
use session::SessionService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Append coarse failure reasons to unauthorized responses.
    /// Must stay off in production: reasons give attackers an oracle for
    /// distinguishing expired, forged, and revoked credentials.
    pub expose_diagnostics: bool,
    /// Snapshot cache settings, including backend selection
    pub cache: CacheConfig,
}

/// Build the session service from the configuration.
/// Panics on invalid cache configuration; validate earlier for a soft error.
pub fn build_service(config: &ServerConfig) -> Arc<SessionService> {
    let jwt = Arc::new(JwtConfig::new(&config.jwt_secret));
    let snapshot_store =
        build_snapshot_store(&config.cache).expect("Invalid snapshot cache configuration");
    Arc::new(SessionService::new(
        config.db.clone(),
        jwt,
        snapshot_store,
        config.cache.clone(),
    ))
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let service = build_service(config);
    let api_router =
        create_api_router(service, config.secure_cookies, config.expose_diagnostics);

    Router::new().nest("/api", api_router)
}

/// Run cleanup once and spawn the background scheduler.
/// Call this before starting the server; abort the returned handle during
/// shutdown to stop the timer.
pub async fn init_cleanup(db: &Database) -> tokio::task::JoinHandle<()> {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone())
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    // The scheduler handle is detached here; it lives as long as the process
    let _cleanup = init_cleanup(&config.db).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
