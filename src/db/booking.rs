//! Recent booking activity, read during session snapshot rebuilds.

use sqlx::sqlite::SqlitePool;

/// A compact view of a booking for the session snapshot.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BookingSummary {
    pub uuid: String,
    pub listing_name: String,
    pub status: String,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct BookingSummaryRow {
    uuid: String,
    listing_name: String,
    status: String,
    created_at: String,
}

impl From<BookingSummaryRow> for BookingSummary {
    fn from(row: BookingSummaryRow) -> Self {
        Self {
            uuid: row.uuid,
            listing_name: row.listing_name,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

pub struct BookingStore {
    pool: SqlitePool,
}

impl BookingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a booking. Returns the booking UUID.
    pub async fn create(
        &self,
        user_uuid: &str,
        listing_name: &str,
        status: &str,
    ) -> Result<String, sqlx::Error> {
        let uuid = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO bookings (uuid, user_uuid, listing_name, status) VALUES (?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(user_uuid)
        .bind(listing_name)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(uuid)
    }

    /// Most recent bookings for a user, newest first.
    pub async fn recent_for_user(
        &self,
        user_uuid: &str,
        limit: i64,
    ) -> Result<Vec<BookingSummary>, sqlx::Error> {
        let rows: Vec<BookingSummaryRow> = sqlx::query_as(
            "SELECT uuid, listing_name, status, created_at FROM bookings \
             WHERE user_uuid = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_uuid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BookingSummary::from).collect())
    }
}
