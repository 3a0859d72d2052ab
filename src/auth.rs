//! Password hashing and bearer tokens.
//!
//! Passwords are stored as Argon2id PHC strings. Tokens have the form
//! `v1.<payload>.<signature>`, where the payload is the base64url JSON
//! `{sub, role, exp}` and the signature is the base64url HMAC-SHA256 of
//! `v1.<payload>` under the server secret.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};

use crate::errors::BackendError;
use crate::record::Id;
use crate::user::Role;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";
const TEMPORARY_PASSWORD_LENGTH: usize = 8;

fn mac(key: &[u8]) -> Result<HmacSha256, BackendError> {
    HmacSha256::new_from_slice(key).map_err(|_| BackendError::SigningFailed)
}

/// Hashes `password` with Argon2id under a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, BackendError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|_| BackendError::SigningFailed)?;

    Ok(hash.to_string())
}

/// Checks `password` against a hash produced by `hash_password`.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// Generates an 8-character alphanumeric password from the OS random
/// source.
pub fn temporary_password() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TEMPORARY_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// The identity a verified token carries.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Claims {
    /// The user ID.
    pub sub: Id,

    pub role: Role,

    /// Expiry as a Unix timestamp.
    pub exp: i64,
}

/// Issues and verifies bearer tokens.
pub struct TokenSigner {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>, lifetime: Duration) -> Self {
        TokenSigner {
            secret: secret.into(),
            lifetime,
        }
    }

    pub fn issue(&self, user_id: Id, role: Role) -> Result<String, BackendError> {
        self.issue_at(user_id, role, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, user_id: Id, role: Role, now: OffsetDateTime) -> Result<String, BackendError> {
        let claims = Claims {
            sub: user_id,
            role,
            exp: (now + self.lifetime).unix_timestamp(),
        };

        let payload = serde_json::to_vec(&claims).map_err(|_| BackendError::SigningFailed)?;
        let unsigned = format!("{}.{}", TOKEN_VERSION, URL_SAFE_NO_PAD.encode(payload));

        let mut mac = mac(&self.secret)?;
        mac.update(unsigned.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", unsigned, signature))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, BackendError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, BackendError> {
        let (unsigned, signature) = token.rsplit_once('.').ok_or(BackendError::InvalidToken)?;
        let (version, payload) = unsigned.split_once('.').ok_or(BackendError::InvalidToken)?;

        if version != TOKEN_VERSION {
            return Err(BackendError::InvalidToken);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| BackendError::InvalidToken)?;

        let mut mac = mac(&self.secret)?;
        mac.update(unsigned.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| BackendError::InvalidToken)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| BackendError::InvalidToken)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| BackendError::InvalidToken)?;

        if claims.exp <= now.unix_timestamp() {
            return Err(BackendError::InvalidToken);
        }

        Ok(claims)
    }

    /// Extracts and verifies the token of an `Authorization: Bearer …`
    /// header.
    pub fn authenticate(&self, header: Option<&str>) -> Result<Claims, BackendError> {
        let header = header.ok_or(BackendError::MissingToken)?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(BackendError::InvalidToken)?;

        self.verify(token)
    }
}
