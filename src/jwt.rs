//! JWT token generation and validation.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::UserRole;

/// Issuer claim stamped on every token.
pub const TOKEN_ISSUER: &str = "nestlock";

/// Audience claim stamped on every token.
pub const TOKEN_AUDIENCE: &str = "nestlock-api";

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token (15 minutes) - stateless, never persisted
    Access,
    /// Long-lived refresh token (7 days) - tracked in the session store by hash
    Refresh,
}

/// JWT claims for access tokens (stateless).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// User role
    pub role: UserRole,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID. Makes every issued token unique so that each maps to
    /// exactly one session record via its hash.
    pub jti: String,
    /// Subject (user UUID)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

fn base_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.set_audience(&[TOKEN_AUDIENCE]);
    validation
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Generate an access token for a user.
    /// Access tokens are short-lived (15 minutes) and stateless.
    pub fn generate_access_token(
        &self,
        user_uuid: &str,
        role: UserRole,
    ) -> Result<AccessTokenResult, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let claims = AccessClaims {
            sub: user_uuid.to_string(),
            role,
            token_type: TokenType::Access,
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp: now + ACCESS_TOKEN_DURATION_SECS,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            duration: ACCESS_TOKEN_DURATION_SECS,
        })
    }

    /// Generate a refresh token for a user.
    /// Refresh tokens are long-lived (7 days); the caller is responsible for
    /// recording the session that makes them usable.
    pub fn generate_refresh_token(&self, user_uuid: &str) -> Result<RefreshTokenResult, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let exp = now + REFRESH_TOKEN_DURATION_SECS;

        let claims = RefreshClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user_uuid.to_string(),
            token_type: TokenType::Refresh,
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            issued_at: now,
            expires_at: exp,
            duration: REFRESH_TOKEN_DURATION_SECS,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &base_validation())
                .map_err(classify_decode_error)?;

        if token_data.claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let token_data =
            jsonwebtoken::decode::<RefreshClaims>(token, &self.decoding_key, &base_validation())
                .map_err(classify_decode_error)?;

        if token_data.claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }
}

/// Split decode failures into structurally-broken input vs a well-formed
/// token that fails signature/expiry/claim checks. The distinction is for
/// internal logging only; both collapse to a generic failure at the API
/// boundary.
fn classify_decode_error(e: jsonwebtoken::errors::Error) -> JwtError {
    match e.kind() {
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => JwtError::Malformed(e),
        _ => JwtError::SignatureOrExpiry(e),
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Input is not a parsable JWT at all
    Malformed(jsonwebtoken::errors::Error),
    /// Well-formed token failing signature, expiry, issuer, or audience checks
    SignatureOrExpiry(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Malformed(e) => write!(f, "Malformed token: {}", e),
            JwtError::SignatureOrExpiry(e) => write!(f, "Token validation failed: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}
