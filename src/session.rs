//! Session lifecycle orchestration.
//!
//! [`SessionService`] ties the token layer, the session store, and the
//! snapshot cache together:
//! - issues access/refresh token pairs and records the session that makes
//!   the refresh token usable
//! - validates refresh tokens (stateless checks first, then the store)
//! - pairs every revocation with a snapshot cache eviction, so revoked
//!   sessions stop being visible without waiting for the cache TTL
//! - serves the aggregated session snapshot with refresh-ahead reads
//!
//! Store failures during validation fail closed (authentication denied).
//! Cache failures fail soft: a read that cannot reach the cache falls
//! through to a rebuild, and a write that cannot reach it is logged and
//! dropped.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::cache::{CacheConfig, CachedSnapshot, SnapshotStore};
use crate::db::{Database, DeviceMeta, SessionRecord, hash_token};
use crate::jwt::{AccessTokenResult, JwtConfig, JwtError};
use crate::permissions;

/// How many recent bookings a snapshot carries.
const RECENT_BOOKINGS_LIMIT: i64 = 5;

/// An issued access/refresh token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    /// Access token lifetime in seconds
    pub access_expires_in: u64,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: u64,
}

/// Errors from session lifecycle operations.
///
/// `Token`, `SessionNotFound`, `PrincipalNotFound`, and `PrincipalDisabled`
/// all collapse to one generic authentication failure at the API boundary;
/// the distinction exists for internal logging.
#[derive(Debug)]
pub enum SessionError {
    /// Stateless token verification failed
    Token(JwtError),
    /// Token is cryptographically valid but no active session matches
    /// (revoked, replaced, or never issued here)
    SessionNotFound,
    /// No user exists for the credential's subject
    PrincipalNotFound,
    /// The user account is deactivated
    PrincipalDisabled,
    /// Session store unreachable; validation fails closed
    Store(sqlx::Error),
    /// Snapshot rebuild failed or timed out
    SnapshotUnavailable(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Token(e) => write!(f, "Token verification failed: {}", e),
            SessionError::SessionNotFound => write!(f, "No matching active session"),
            SessionError::PrincipalNotFound => write!(f, "Unknown principal"),
            SessionError::PrincipalDisabled => write!(f, "Principal account is disabled"),
            SessionError::Store(e) => write!(f, "Session store error: {}", e),
            SessionError::SnapshotUnavailable(msg) => {
                write!(f, "Session snapshot unavailable: {}", msg)
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<JwtError> for SessionError {
    fn from(e: JwtError) -> Self {
        SessionError::Token(e)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Orchestrates token issuance, session tracking, revocation, and the
/// snapshot cache. Cheap to clone behind `Arc`; constructed once at startup
/// and injected into the HTTP layer.
pub struct SessionService {
    db: Database,
    jwt: Arc<JwtConfig>,
    cache: Arc<dyn SnapshotStore>,
    cache_config: CacheConfig,
}

impl SessionService {
    pub fn new(
        db: Database,
        jwt: Arc<JwtConfig>,
        cache: Arc<dyn SnapshotStore>,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            db,
            jwt,
            cache,
            cache_config,
        }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Issue an access/refresh token pair for a user and record the
    /// session. Called by login, registration, OTP, and OAuth flows after
    /// they have authenticated the user.
    pub async fn issue_token_pair(
        &self,
        principal_uuid: &str,
        device: &DeviceMeta,
    ) -> Result<TokenPair, SessionError> {
        let user = self
            .db
            .users()
            .get_by_uuid(principal_uuid)
            .await
            .map_err(SessionError::Store)?
            .ok_or(SessionError::PrincipalNotFound)?;

        if !user.is_active {
            return Err(SessionError::PrincipalDisabled);
        }

        let access = self.jwt.generate_access_token(&user.uuid, user.role)?;
        let refresh = self.jwt.generate_refresh_token(&user.uuid)?;

        self.db
            .sessions()
            .create(
                &user.uuid,
                &hash_token(&refresh.token),
                device,
                refresh.issued_at,
                refresh.expires_at,
            )
            .await
            .map_err(SessionError::Store)?;

        Ok(TokenPair {
            access: access.token,
            refresh: refresh.token,
            access_expires_in: access.duration,
            refresh_expires_in: refresh.duration,
        })
    }

    /// Validate a refresh token. Runs the cheap stateless checks first
    /// (signature, expiry, type) and only then hits the store; returns the
    /// matching session record if it is active and unexpired.
    ///
    /// The `last_used` stamp is advanced best-effort: a failure there is
    /// logged and never fails the validation.
    pub async fn validate_session(
        &self,
        refresh_token: &str,
    ) -> Result<SessionRecord, SessionError> {
        self.jwt.validate_refresh_token(refresh_token)?;

        let token_hash = hash_token(refresh_token);
        let record = self
            .db
            .sessions()
            .validate(&token_hash)
            .await
            .map_err(SessionError::Store)?
            .ok_or(SessionError::SessionNotFound)?;

        if let Err(e) = self.db.sessions().touch_last_used(&token_hash).await {
            warn!(error = %e, "Failed to update session last_used");
        }

        Ok(record)
    }

    /// Exchange a valid refresh token for a new access token.
    pub async fn refresh_access(
        &self,
        refresh_token: &str,
    ) -> Result<AccessTokenResult, SessionError> {
        let record = self.validate_session(refresh_token).await?;

        let user = self
            .db
            .users()
            .get_by_uuid(&record.user_uuid)
            .await
            .map_err(SessionError::Store)?
            .ok_or(SessionError::PrincipalNotFound)?;

        if !user.is_active {
            return Err(SessionError::PrincipalDisabled);
        }

        Ok(self.jwt.generate_access_token(&user.uuid, user.role)?)
    }

    /// Revoke the session behind a refresh token and evict the user's
    /// snapshot. Idempotent: revoking an already revoked or unknown token
    /// is a no-op, not an error.
    ///
    /// Works directly on the token hash, so logout still clears the record
    /// even when the presented token no longer passes stateless checks.
    pub async fn revoke_session(&self, refresh_token: &str) -> Result<(), SessionError> {
        let token_hash = hash_token(refresh_token);

        let record = self
            .db
            .sessions()
            .get_by_hash(&token_hash)
            .await
            .map_err(SessionError::Store)?;

        let Some(record) = record else {
            return Ok(());
        };

        self.db
            .sessions()
            .revoke_by_hash(&token_hash)
            .await
            .map_err(SessionError::Store)?;

        self.evict_snapshot(&record.user_uuid).await;
        Ok(())
    }

    /// Revoke every active session for a user and evict their snapshot.
    /// Returns the number of sessions revoked. Sessions created after this
    /// call are unaffected.
    pub async fn revoke_all_sessions(&self, principal_uuid: &str) -> Result<u64, SessionError> {
        let revoked = self
            .db
            .sessions()
            .revoke_all_for_user(principal_uuid)
            .await
            .map_err(SessionError::Store)?;

        self.evict_snapshot(principal_uuid).await;
        Ok(revoked)
    }

    /// Active sessions for a user, for the "where am I logged in" view.
    pub async fn list_sessions(
        &self,
        principal_uuid: &str,
    ) -> Result<Vec<SessionRecord>, SessionError> {
        self.db
            .sessions()
            .list_active_for_user(principal_uuid)
            .await
            .map_err(SessionError::Store)
    }

    /// Aggregated session snapshot for a user, served read-through with a
    /// refresh-ahead policy:
    /// - fresh entry (`now < refresh_at`): returned as-is, no I/O
    /// - stale entry (`refresh_at <= now < expires_at`): rebuilt before
    ///   responding; if the rebuild fails, the still-valid cached value is
    ///   served instead
    /// - missing or hard-expired entry: rebuild is mandatory and blocking
    ///
    /// Concurrent readers of a stale entry may each trigger a rebuild.
    /// Rebuilds are idempotent and converge, so the duplicate work is
    /// tolerated rather than serialized.
    pub async fn get_session_snapshot(
        &self,
        principal_uuid: &str,
    ) -> Result<CachedSnapshot, SessionError> {
        let cached = match self.cache.get(principal_uuid).await {
            Ok(entry) => entry,
            Err(e) => {
                // Cache unavailability is never surfaced: treat as a miss
                warn!(error = %e, "Snapshot cache read failed, rebuilding");
                None
            }
        };

        let now = unix_now();

        if let Some(snapshot) = cached {
            if now < snapshot.refresh_at {
                return Ok(snapshot);
            }

            if now < snapshot.expires_at {
                debug!(principal = %principal_uuid, "Snapshot stale, rebuilding ahead of expiry");
                return match self.rebuild_snapshot(principal_uuid).await {
                    Ok(rebuilt) => Ok(rebuilt),
                    Err(e) => {
                        // The cached value is still inside its hard TTL
                        warn!(error = %e, "Snapshot rebuild failed, serving cached value");
                        Ok(snapshot)
                    }
                };
            }
        }

        self.rebuild_snapshot(principal_uuid).await
    }

    /// Recompute a user's snapshot from ground truth and store it.
    ///
    /// The principal row and the recent-activity read run concurrently and
    /// share one deadline; hitting it surfaces as `SnapshotUnavailable`
    /// rather than a hang. A cache write failure is logged and dropped:
    /// the caller still gets the freshly computed value.
    async fn rebuild_snapshot(&self, principal_uuid: &str) -> Result<CachedSnapshot, SessionError> {
        let deadline = Duration::from_millis(self.cache_config.rebuild_timeout_ms);

        let (user, bookings) = tokio::time::timeout(deadline, async {
            let users = self.db.users();
            let bookings = self.db.bookings();
            tokio::join!(
                users.get_by_uuid(principal_uuid),
                bookings.recent_for_user(principal_uuid, RECENT_BOOKINGS_LIMIT),
            )
        })
        .await
        .map_err(|_| SessionError::SnapshotUnavailable("rebuild timed out".to_string()))?;

        let user = user
            .map_err(SessionError::Store)?
            .ok_or(SessionError::PrincipalNotFound)?;

        if !user.is_active {
            return Err(SessionError::PrincipalDisabled);
        }

        let bookings = bookings.map_err(SessionError::Store)?;

        let now = unix_now();
        let expires_at = now + self.cache_config.ttl_seconds;
        let snapshot = CachedSnapshot {
            principal_id: user.uuid,
            role: user.role,
            permissions: permissions::for_role(user.role)
                .iter()
                .map(|p| p.to_string())
                .collect(),
            display_name: user.display_name,
            email: user.email,
            is_verified: user.is_verified,
            recent_bookings: bookings,
            cached_at: now,
            expires_at,
            refresh_at: expires_at - self.cache_config.refresh_lead_seconds,
        };

        if let Err(e) = self.cache.put(&snapshot).await {
            warn!(error = %e, "Failed to store rebuilt snapshot");
        }

        Ok(snapshot)
    }

    /// Best-effort snapshot eviction; paired with every revocation.
    async fn evict_snapshot(&self, principal_uuid: &str) {
        if let Err(e) = self.cache.delete(principal_uuid).await {
            warn!(error = %e, principal = %principal_uuid, "Failed to evict session snapshot");
        }
    }
}
