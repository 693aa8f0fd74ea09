//! Shared snapshot cache backed by Redis.
//!
//! Snapshots are stored as JSON under a namespaced key with a server-side
//! TTL, so entries disappear on their own even if no instance evicts them.

use super::{CacheError, CachedSnapshot, SnapshotStore};

pub struct RedisSnapshotStore {
    client: redis::Client,
    ttl_seconds: u64,
}

fn key(principal_uuid: &str) -> String {
    format!("session_snapshot:{}", principal_uuid)
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

impl RedisSnapshotStore {
    pub fn new(url: &str, ttl_seconds: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Backend(format!("Failed to open Redis client: {}", e)))?;
        Ok(Self {
            client,
            ttl_seconds,
        })
    }
}

#[async_trait::async_trait]
impl SnapshotStore for RedisSnapshotStore {
    async fn get(&self, principal_uuid: &str) -> Result<Option<CachedSnapshot>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let data: Option<String> = redis::cmd("GET")
            .arg(key(principal_uuid))
            .query_async(&mut conn)
            .await?;

        match data {
            Some(json) => {
                let snapshot = serde_json::from_str(&json).map_err(CacheError::Encoding)?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, snapshot: &CachedSnapshot) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let json = serde_json::to_string(snapshot).map_err(CacheError::Encoding)?;
        redis::cmd("SETEX")
            .arg(key(&snapshot.principal_id))
            .arg(self.ttl_seconds)
            .arg(json)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, principal_uuid: &str) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("DEL")
            .arg(key(principal_uuid))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
