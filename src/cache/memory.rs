//! In-process snapshot cache backed by moka.

use moka::future::Cache;
use std::time::Duration;

use super::{CacheError, CachedSnapshot, SnapshotStore};

/// Upper bound on cached users. Well above any single-instance deployment;
/// moka evicts least-recently-used entries beyond it.
const MAX_ENTRIES: u64 = 100_000;

pub struct MemorySnapshotStore {
    cache: Cache<String, CachedSnapshot>,
}

impl MemorySnapshotStore {
    /// Create a store whose entries live at most `ttl_seconds`. The
    /// snapshot's own `expires_at` is the authoritative expiry; the moka
    /// TTL just keeps dead entries from lingering.
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(Duration::from_secs(ttl_seconds))
                .build(),
        }
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, principal_uuid: &str) -> Result<Option<CachedSnapshot>, CacheError> {
        Ok(self.cache.get(principal_uuid).await)
    }

    async fn put(&self, snapshot: &CachedSnapshot) -> Result<(), CacheError> {
        self.cache
            .insert(snapshot.principal_id.clone(), snapshot.clone())
            .await;
        Ok(())
    }

    async fn delete(&self, principal_uuid: &str) -> Result<(), CacheError> {
        self.cache.invalidate(principal_uuid).await;
        Ok(())
    }
}
