//! Email verification tokens.
//!
//! Tokens are 256-bit random values rendered as URL-safe base64 so they can
//! travel in a mail link. Only their SHA-256 digest is persisted.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Default verification token lifetime: 24 hours.
pub const DEFAULT_VERIFICATION_TTL_SECS: i64 = 24 * 60 * 60;

const TOKEN_BYTES: usize = 32;

/// Generate a fresh verification token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of a token, as stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Expiry of a token issued at `now` with lifetime `ttl`. `None` means the
/// token never expires; a lifetime past the calendar's end saturates.
pub fn expiry_after(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.map(|ttl| now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC))
}

/// Whether a token with the given expiry is still usable at `now`.
pub fn is_live(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_none_or(|at| now < at)
}
