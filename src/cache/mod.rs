//! Session snapshot caching.
//!
//! The cache holds one precomputed authorization snapshot per user and runs
//! in one of two mutually exclusive modes, chosen at startup:
//! 1. **Local mode (moka)**: in-process caching. Used when Redis is not
//!    configured. Right for single-instance deployments.
//! 2. **Remote mode (Redis)**: shared external store. Used when
//!    `redis_url` is configured, so a fleet of instances sees one cache.
//!
//! Both backends satisfy the same [`SnapshotStore`] contract; the rest of
//! the system never knows which one is running. Staleness policy (refresh
//! ahead of hard expiry) lives in the snapshot's own timestamps and is
//! enforced by the session service, not here.

mod memory;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{BookingSummary, UserRole};

pub use self::memory::MemorySnapshotStore;
pub use self::redis::RedisSnapshotStore;

/// Precomputed authorization snapshot for one user.
///
/// `refresh_at < expires_at` always holds: reads past `refresh_at` trigger
/// a rebuild while the value is still usable, so callers are never served
/// data past `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSnapshot {
    pub principal_id: String,
    pub role: UserRole,
    pub permissions: Vec<String>,
    pub display_name: String,
    pub email: String,
    pub is_verified: bool,
    pub recent_bookings: Vec<BookingSummary>,
    /// When this snapshot was computed (Unix seconds)
    pub cached_at: u64,
    /// Hard expiry: never served past this point (Unix seconds)
    pub expires_at: u64,
    /// Soft expiry: reads past this point trigger a rebuild (Unix seconds)
    pub refresh_at: u64,
}

/// Snapshot cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Snapshot time-to-live in seconds.
    pub ttl_seconds: u64,
    /// How long before hard expiry a read starts triggering rebuilds.
    /// Must be strictly less than `ttl_seconds`.
    pub refresh_lead_seconds: u64,
    /// Upper bound on the downstream reads of one snapshot rebuild.
    pub rebuild_timeout_ms: u64,
    /// Redis connection URL. Empty selects the in-process backend.
    pub redis_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            refresh_lead_seconds: 60,
            rebuild_timeout_ms: 200,
            redis_url: String::new(),
        }
    }
}

impl CacheConfig {
    /// Validate the configuration. A refresh lead equal to or longer than
    /// the TTL would make every snapshot stale from birth.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.ttl_seconds == 0 {
            return Err(CacheError::InvalidConfig(
                "ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if self.refresh_lead_seconds >= self.ttl_seconds {
            return Err(CacheError::InvalidConfig(format!(
                "refresh_lead_seconds ({}) must be less than ttl_seconds ({})",
                self.refresh_lead_seconds, self.ttl_seconds
            )));
        }
        Ok(())
    }
}

/// Storage contract shared by both cache backends.
///
/// Implementations store snapshots verbatim; timestamp policy belongs to
/// the caller.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Fetch the snapshot for a user, if present.
    async fn get(&self, principal_uuid: &str) -> Result<Option<CachedSnapshot>, CacheError>;

    /// Store a snapshot, unconditionally overwriting any previous one.
    async fn put(&self, snapshot: &CachedSnapshot) -> Result<(), CacheError>;

    /// Evict the snapshot for a user.
    async fn delete(&self, principal_uuid: &str) -> Result<(), CacheError>;
}

/// Build the snapshot store selected by the configuration.
pub fn build_snapshot_store(config: &CacheConfig) -> Result<Arc<dyn SnapshotStore>, CacheError> {
    config.validate()?;

    if config.redis_url.is_empty() {
        info!("Using in-process snapshot cache");
        Ok(Arc::new(MemorySnapshotStore::new(config.ttl_seconds)))
    } else {
        info!("Using Redis snapshot cache");
        Ok(Arc::new(RedisSnapshotStore::new(
            &config.redis_url,
            config.ttl_seconds,
        )?))
    }
}

/// Errors from the snapshot cache.
#[derive(Debug)]
pub enum CacheError {
    /// Rejected configuration.
    InvalidConfig(String),
    /// Backend unreachable or failing. Non-fatal: readers treat this as a
    /// cache miss.
    Backend(String),
    /// Snapshot could not be (de)serialized for the external backend.
    Encoding(serde_json::Error),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::InvalidConfig(msg) => write!(f, "Invalid cache configuration: {}", msg),
            CacheError::Backend(msg) => write!(f, "Cache backend error: {}", msg),
            CacheError::Encoding(e) => write!(f, "Failed to encode snapshot: {}", e),
        }
    }
}

impl std::error::Error for CacheError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(uuid: &str, cached_at: u64) -> CachedSnapshot {
        CachedSnapshot {
            principal_id: uuid.to_string(),
            role: UserRole::Guest,
            permissions: vec!["listings:read".to_string()],
            display_name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            is_verified: true,
            recent_bookings: Vec::new(),
            cached_at,
            expires_at: cached_at + 300,
            refresh_at: cached_at + 240,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_refresh_lead_must_be_less_than_ttl() {
        let config = CacheConfig {
            ttl_seconds: 60,
            refresh_lead_seconds: 60,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfig(_))
        ));

        let config = CacheConfig {
            ttl_seconds: 60,
            refresh_lead_seconds: 120,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = CacheConfig {
            ttl_seconds: 0,
            refresh_lead_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_factory_rejects_invalid_config() {
        let config = CacheConfig {
            ttl_seconds: 10,
            refresh_lead_seconds: 10,
            ..Default::default()
        };
        assert!(build_snapshot_store(&config).is_err());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = build_snapshot_store(&CacheConfig::default()).unwrap();

        let snap = snapshot("alice-uuid", 1_700_000_000);
        store.put(&snap).await.unwrap();

        let fetched = store.get("alice-uuid").await.unwrap().unwrap();
        assert_eq!(fetched.principal_id, "alice-uuid");
        assert_eq!(fetched.cached_at, snap.cached_at);
        assert_eq!(fetched.permissions, snap.permissions);

        assert!(store.get("bob-uuid").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_overwrite_and_delete() {
        let store = build_snapshot_store(&CacheConfig::default()).unwrap();

        store.put(&snapshot("alice-uuid", 100)).await.unwrap();
        store.put(&snapshot("alice-uuid", 200)).await.unwrap();

        let fetched = store.get("alice-uuid").await.unwrap().unwrap();
        assert_eq!(fetched.cached_at, 200);

        store.delete("alice-uuid").await.unwrap();
        assert!(store.get("alice-uuid").await.unwrap().is_none());

        // Deleting a missing entry is a no-op
        store.delete("alice-uuid").await.unwrap();
    }
}
