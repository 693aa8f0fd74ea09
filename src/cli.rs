//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::cache::CacheConfig;
use crate::db::Database;
use clap::Parser;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Nestlock",
    about = "Session lifecycle service: token pairs, revocation, and session snapshots"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7320")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "nestlock.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Redis URL for the shared snapshot cache. Omit to cache in-process
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Session snapshot time-to-live in seconds
    #[arg(long, default_value = "300")]
    pub snapshot_ttl: u64,

    /// Seconds before snapshot expiry at which reads start rebuilding.
    /// Must be less than the TTL
    #[arg(long, default_value = "60")]
    pub snapshot_refresh_lead: u64,

    /// Upper bound in milliseconds on the reads of one snapshot rebuild
    #[arg(long, default_value = "200")]
    pub snapshot_rebuild_timeout_ms: u64,

    /// Set the Secure flag on cookies (use when serving behind HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Append coarse failure reasons to unauthorized responses.
    /// Never enable in production
    #[arg(long)]
    pub expose_auth_diagnostics: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build and validate the cache configuration from arguments.
/// Returns None and logs an error if validation fails.
pub fn build_cache_config(args: &Args) -> Option<CacheConfig> {
    let config = CacheConfig {
        ttl_seconds: args.snapshot_ttl,
        refresh_lead_seconds: args.snapshot_refresh_lead,
        rebuild_timeout_ms: args.snapshot_rebuild_timeout_ms,
        redis_url: args.redis_url.clone().unwrap_or_default(),
    };

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid snapshot cache configuration");
        return None;
    }

    Some(config)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    jwt_secret: String,
    cache: CacheConfig,
) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        secure_cookies: args.secure_cookies,
        expose_diagnostics: args.expose_auth_diagnostics,
        cache,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
