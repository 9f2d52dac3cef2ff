use std::{fmt, str::FromStr, time::Duration};

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ApiError;

/// Role
///
/// Coarse permission class carried in the `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            _ => Err(TokenError::Malformed),
        }
    }
}

/// UserId
///
/// Canonical identifier of a principal. Token subjects and path parameters are both
/// normalised to this type before they are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(UserId)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subject
///
/// The `sub` claim as it appears on the wire. Tokens issued here carry a string, older
/// tokens carry the numeric primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subject {
    Numeric(u64),
    Text(String),
}

/// Claims
///
/// The raw JWT payload. Only `TokenVerifier` reads this; everything downstream sees the
/// validated `AuthUser`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Subject,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub iat: u64,
    pub exp: u64,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Inserted into the request
/// extensions by the authentication middleware and read back by the role and ownership
/// middleware and by handlers through the extractor below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    /// Absent on tokens minted by older login flows.
    pub role: Option<Role>,
    pub expires_at: DateTime<Utc>,
}

impl AuthUser {
    pub fn is_teacher(&self) -> bool {
        self.role == Some(Role::Teacher)
    }
}

/// Handlers take `AuthUser` as an argument. The value only exists if `require_auth` ran
/// earlier in the chain, so a missing extension means the route was wired without it.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::MissingCredentials)
    }
}

/// TokenError
///
/// Why a bearer token was refused. Callers only ever see a generic 401.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature or algorithm is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
}

/// Every HMAC variant is accepted; nothing else is.
const HMAC_FAMILY: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// TokenVerifier
///
/// Validates bearer tokens against the shared secret. Built once from `AppConfig` and
/// shared read-only between requests.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_FAMILY.to_vec();
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// verify
    ///
    /// Decodes the token, checks the algorithm, signature and expiry, and turns the
    /// payload into a typed `AuthUser`.
    pub fn verify(&self, token: &str) -> Result<AuthUser, TokenError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed,
            }
        })?;
        let claims = data.claims;

        // `exp` must be strictly in the future.
        let now = Utc::now().timestamp();
        let exp = i64::try_from(claims.exp).map_err(|_| TokenError::Malformed)?;
        if exp <= now {
            return Err(TokenError::Expired);
        }
        let expires_at = DateTime::<Utc>::from_timestamp(exp, 0).ok_or(TokenError::Malformed)?;

        let id = match claims.sub {
            Subject::Numeric(n) => UserId(n),
            Subject::Text(s) => s.parse().map_err(|_| TokenError::Malformed)?,
        };
        let role = claims.role.as_deref().map(str::parse::<Role>).transpose()?;

        Ok(AuthUser {
            id,
            email: claims.email,
            role,
            expires_at,
        })
    }
}

/// TokenIssuer
///
/// Signs HS256 tokens for principals that just proved their credentials.
pub struct TokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, id: i64, email: &str, role: Role) -> Result<String, ApiError> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: Subject::Text(id.to_string()),
            email: email.to_string(),
            role: Some(role.as_str().to_string()),
            iat: now,
            exp: now + self.ttl.as_secs(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
    }
}

/// hash_password
///
/// bcrypt is CPU-bound, so hashing runs on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("failed to verify password: {e}")))
}
