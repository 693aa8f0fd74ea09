use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Guest,
    Host,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Guest => "guest",
            UserRole::Host => "host",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            "host" => UserRole::Host,
            _ => UserRole::Guest,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    email: String,
    display_name: String,
    role: String,
    is_active: i32,
    is_verified: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            email: row.email,
            display_name: row.display_name,
            role: UserRole::from_str(&row.role),
            is_active: row.is_active != 0,
            is_verified: row.is_verified != 0,
        }
    }
}

const USER_COLUMNS: &str = "id, uuid, email, display_name, role, is_active, is_verified";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the user ID.
    pub async fn create(
        &self,
        uuid: &str,
        email: &str,
        display_name: &str,
        role: UserRole,
    ) -> Result<i64, sqlx::Error> {
        let result =
            sqlx::query("INSERT INTO users (uuid, email, display_name, role) VALUES (?, ?, ?, ?)")
                .bind(uuid)
                .bind(email)
                .bind(display_name)
                .bind(role.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE uuid = ?", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by email.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let row: Option<UserRow> = sqlx::query_as(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Set the role for a user.
    pub async fn set_role(&self, uuid: &str, role: UserRole) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE uuid = ?")
            .bind(role.as_str())
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deactivate a user account. Live sessions are revoked separately.
    pub async fn deactivate(&self, uuid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET is_active = 0 WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a user as verified (after email/phone confirmation).
    pub async fn mark_verified(&self, uuid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET is_verified = 1 WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
