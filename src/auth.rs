use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{PasswordHash, SaltString},
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, header, request::Parts},
};
use axum_extra::extract::CookieJar;
use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Role;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";
/// Header set by the access guard with the authorized user's id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header set by the access guard with the authorized user's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

const DELIMITER: char = ':';

// Standard alphabet; padding is written on encode and optional on decode.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// TokenError
///
/// Why a presented session token could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not valid base64")]
    NotBase64,
    #[error("token payload is not UTF-8")]
    NotUtf8,
    #[error("token payload has no delimiter")]
    MissingDelimiter,
    #[error("token payload has an empty user id")]
    EmptyUserId,
    #[error("token timestamp {0:?} is not an integer")]
    BadTimestamp(String),
}

/// SessionToken
///
/// The decoded form of a session token: `base64(user_id ":" issued_at_millis)`.
///
/// The encoding is reversible and carries no signature, so anyone can mint a token for any
/// user id. The guard compensates only partially by re-reading the user's role on every
/// request. Production deployments need a signed (HMAC) or server-side opaque token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub user_id: String,
    pub issued_at_ms: i64,
}

impl SessionToken {
    pub fn new(user_id: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            issued_at_ms: issued_at.timestamp_millis(),
        }
    }

    pub fn encode(&self) -> String {
        TOKEN_ENGINE.encode(format!("{}{}{}", self.user_id, DELIMITER, self.issued_at_ms))
    }

    /// decode
    ///
    /// Splits on the first delimiter, so the timestamp part never contains one. User ids
    /// that contain the delimiter therefore do not round-trip.
    pub fn decode(raw: &str) -> Result<Self, TokenError> {
        let bytes = TOKEN_ENGINE.decode(raw).map_err(|_| TokenError::NotBase64)?;
        let payload = String::from_utf8(bytes).map_err(|_| TokenError::NotUtf8)?;
        let (user_id, timestamp) = payload
            .split_once(DELIMITER)
            .ok_or(TokenError::MissingDelimiter)?;
        if user_id.is_empty() {
            return Err(TokenError::EmptyUserId);
        }
        let issued_at_ms = timestamp
            .parse::<i64>()
            .map_err(|_| TokenError::BadTimestamp(timestamp.to_string()))?;
        Ok(Self {
            user_id: user_id.to_string(),
            issued_at_ms,
        })
    }

    /// Milliseconds elapsed since issue. Negative when the token claims a future issue time.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis().saturating_sub(self.issued_at_ms)
    }
}

/// issue_token
///
/// Mints the token handed to a user at login.
pub fn issue_token(user_id: &str, now: DateTime<Utc>) -> String {
    SessionToken::new(user_id, now).encode()
}

/// extract_token
///
/// Pulls the raw session token out of a request: the `session` cookie wins, otherwise the
/// `Authorization: Bearer` header. Empty values count as absent.
pub fn extract_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// hash_password
///
/// Produces an argon2 PHC string with a random 16-byte salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|_| argon2::password_hash::Error::Crypto)?;
    let salt = SaltString::encode_b64(&salt_bytes)?;
    let phc = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(phc.to_string())
}

/// A well-formed argon2 hash that matches no password. Login verifies against it when the
/// email is unknown, so both rejection paths cost one argon2 run.
pub const UNKNOWN_USER_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// verify_password
///
/// False for a wrong password and for an unparseable stored hash alike.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// AuthUser
///
/// The identity the access guard attached to a request it authorized. Handlers behind
/// the guard take it as an argument instead of decoding the token again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
}

/// AuthUser Extractor Implementation
///
/// Reads the `x-user-id` / `x-user-role` headers. The guard strips client-supplied copies
/// of these headers before deciding, so their presence means the guard set them.
///
/// Rejection: `401 Unauthorized` when either header is missing or the role is unknown,
/// which only happens if a handler is mounted outside the guard or on a non-API path.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Ids may carry non-ASCII UTF-8, which `to_str` would refuse.
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| std::str::from_utf8(value.as_bytes()).ok())
            .filter(|value| !value.is_empty())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Role>().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(AuthUser {
            id: id.to_string(),
            role,
        })
    }
}
