//! Session token (JWT) generation and verification.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{info, warn};

use super::AuthError;
use crate::models::auth::TokenClaims;

/// HS256 needs at least 256 bits of key material.
pub const MIN_SECRET_BYTES: usize = 32;

/// Default session token lifetime: 24 hours.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// Length of generated signing secrets.
const GENERATED_SECRET_LEN: usize = 64;

/// Turn the configured secret into HS256 key material.
///
/// Secrets shorter than [`MIN_SECRET_BYTES`] are zero-padded instead of
/// rejected. This keeps short development secrets working but leaves the
/// effective key no stronger than the original secret.
pub fn signing_key(secret: &str) -> Vec<u8> {
    let mut bytes = secret.as_bytes().to_vec();
    if bytes.len() < MIN_SECRET_BYTES {
        warn!(
            secret_len = bytes.len(),
            min_len = MIN_SECRET_BYTES,
            "JWT secret is shorter than the HS256 minimum, zero-padding"
        );
        bytes.resize(MIN_SECRET_BYTES, 0);
    }
    bytes
}

/// Stateless HS256 session tokens with `sub`, `iat` and `exp` claims.
///
/// The key is fixed at construction and never mutated, so one instance can
/// be shared freely across request tasks.
#[derive(Clone)]
pub struct SessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionTokens {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let key = signing_key(secret);
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(&key),
            decoding: DecodingKey::from_secret(&key),
            validation,
            ttl,
        }
    }

    /// Configured token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a signed token asserting `subject`.
    pub fn issue(&self, subject: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
                .timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify signature and expiry, returning the subject.
    ///
    /// Malformed, tampered and expired tokens all yield `None`.
    pub fn validate(&self, token: &str) -> Option<String> {
        decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .ok()
            .map(|data| data.claims.sub)
    }
}

/// Read the persisted signing secret at `path`, generating and writing a
/// fresh one when the file is missing or empty.
pub fn load_or_generate_secret(path: &Path) -> Result<String, AuthError> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AuthError::Internal(format!("create secret dir: {e}")))?;
    }
    std::fs::write(path, &secret)
        .map_err(|e| AuthError::Internal(format!("write secret: {e}")))?;
    info!(path = %path.display(), "generated new JWT secret");
    Ok(secret)
}

/// Default location of the persisted signing secret.
pub fn default_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("salary")
        .join("jwt-secret")
}
