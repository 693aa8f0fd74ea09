//! Server-side session storage for refresh token tracking and revocation.
//!
//! Only refresh tokens are tracked here, keyed by a SHA-256 hash of the raw
//! token. The raw token value is never stored. Access tokens are stateless
//! and short-lived (15 minutes).
//!
//! Revocation is soft: records are deactivated with a `revoked_at` stamp and
//! kept for a grace period so recent revocations remain auditable, then the
//! cleanup sweep deletes them.

use sqlx::sqlite::SqlitePool;

/// A tracked refresh token session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub user_uuid: String,
    pub refresh_token_hash: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
    pub last_used: String,
    pub expires_at: String,
    pub is_active: bool,
    pub revoked_at: Option<String>,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    user_uuid: String,
    refresh_token_hash: String,
    device_name: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: String,
    last_used: String,
    expires_at: String,
    is_active: i32,
    revoked_at: Option<String>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_uuid: row.user_uuid,
            refresh_token_hash: row.refresh_token_hash,
            device_name: row.device_name,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            last_used: row.last_used,
            expires_at: row.expires_at,
            is_active: row.is_active != 0,
            revoked_at: row.revoked_at,
        }
    }
}

/// Client device metadata captured when a session is created.
#[derive(Debug, Clone, Default)]
pub struct DeviceMeta {
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Hash a raw refresh token for storage and lookup.
///
/// The plaintext token is returned to the client but never persisted; only
/// this hash is. Validation hashes the incoming token and looks up by hash.
pub fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

const SESSION_COLUMNS: &str = "id, user_uuid, refresh_token_hash, device_name, ip_address, \
     user_agent, created_at, last_used, expires_at, is_active, revoked_at";

/// Store for managing refresh token sessions.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new session record for an issued refresh token.
    pub async fn create(
        &self,
        user_uuid: &str,
        token_hash: &str,
        device: &DeviceMeta,
        issued_at: u64,
        expires_at: u64,
    ) -> Result<i64, sqlx::Error> {
        let issued_at_str = timestamp_to_datetime(issued_at);
        let expires_at_str = timestamp_to_datetime(expires_at);

        let result = sqlx::query(
            "INSERT INTO sessions (user_uuid, refresh_token_hash, device_name, ip_address, \
             user_agent, created_at, last_used, expires_at, is_active) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(user_uuid)
        .bind(token_hash)
        .bind(device.device_name.as_deref())
        .bind(device.ip_address.as_deref())
        .bind(device.user_agent.as_deref())
        .bind(&issued_at_str)
        .bind(&issued_at_str)
        .bind(&expires_at_str)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Get a session by its token hash, regardless of state.
    pub async fn get_by_hash(&self, token_hash: &str) -> Result<Option<SessionRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM sessions WHERE refresh_token_hash = ?",
            SESSION_COLUMNS
        );
        let row: Option<SessionRow> = sqlx::query_as(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(SessionRecord::from))
    }

    /// Get a session by token hash only if it is active and unexpired.
    pub async fn validate(&self, token_hash: &str) -> Result<Option<SessionRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM sessions WHERE refresh_token_hash = ? \
             AND is_active = 1 AND expires_at > datetime('now')",
            SESSION_COLUMNS
        );
        let row: Option<SessionRow> = sqlx::query_as(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(SessionRecord::from))
    }

    /// Advance the `last_used` stamp for a session.
    pub async fn touch_last_used(&self, token_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sessions SET last_used = datetime('now') WHERE refresh_token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Revoke a session by token hash. Idempotent: revoking an already
    /// revoked or nonexistent session is a no-op. Returns whether a row
    /// changed state.
    pub async fn revoke_by_hash(&self, token_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = 0, revoked_at = datetime('now') \
             WHERE refresh_token_hash = ? AND is_active = 1",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every active session for a user (logout everywhere).
    /// Returns the number of sessions revoked. Sessions created after this
    /// call are unaffected.
    pub async fn revoke_all_for_user(&self, user_uuid: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = 0, revoked_at = datetime('now') \
             WHERE user_uuid = ? AND is_active = 1",
        )
        .bind(user_uuid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// List active, unexpired sessions for a user, newest first.
    pub async fn list_active_for_user(
        &self,
        user_uuid: &str,
    ) -> Result<Vec<SessionRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM sessions WHERE user_uuid = ? AND is_active = 1 \
             AND expires_at > datetime('now') ORDER BY created_at DESC",
            SESSION_COLUMNS
        );
        let rows: Vec<SessionRow> = sqlx::query_as(&query)
            .bind(user_uuid)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    /// Delete sessions that have expired, plus revoked sessions older than
    /// the grace window. Single filtered bulk delete, safe to re-run.
    pub async fn delete_expired(&self, revoked_grace_days: i64) -> Result<u64, sqlx::Error> {
        let grace = format!("-{} days", revoked_grace_days);
        let result = sqlx::query(
            "DELETE FROM sessions WHERE expires_at < datetime('now') \
             OR (is_active = 0 AND revoked_at < datetime('now', ?))",
        )
        .bind(&grace)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Convert a Unix timestamp to an ISO 8601 datetime string for SQLite.
pub(crate) fn timestamp_to_datetime(timestamp: u64) -> String {
    let secs = timestamp;

    let days_since_epoch = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let (year, month, day) = days_to_ymd(days_since_epoch as i64);

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hours, minutes, seconds
    )
}

/// Convert days since Unix epoch to year, month, day.
fn days_to_ymd(days: i64) -> (i32, u32, u32) {
    // Algorithm from http://howardhinnant.github.io/date_algorithms.html
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as i32, m, d)
}
