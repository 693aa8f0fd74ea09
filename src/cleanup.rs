//! Scheduled cleanup of dead session records.
//!
//! Sessions past their expiry, and revoked sessions past the audit grace
//! window, are physically deleted. Each sweep is a single filtered bulk
//! delete: idempotent, re-runnable, and safe next to live traffic since it
//! takes no locks the request path cares about.

use crate::db::Database;
use std::time::Duration;
use tracing::{error, info};

/// How long revoked sessions are kept before deletion, so recent
/// revocations stay visible for audit.
const REVOKED_RETENTION_DAYS: i64 = 30;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Run the cleanup sweep once.
pub async fn run_cleanup(db: &Database) {
    match db.sessions().delete_expired(REVOKED_RETENTION_DAYS).await {
        Ok(count) if count > 0 => info!("Cleaned up {} dead session records", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up session records: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle; abort it during shutdown to stop the timer. The sweep
/// leaves no partial state, so there is nothing to await on stop.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}
