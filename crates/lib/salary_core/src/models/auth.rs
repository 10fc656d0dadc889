//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! types (which use camelCase field names).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Account role.
///
/// `Boss` holds every privilege `Employee` has plus the administrative ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Employee,
    Boss,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Boss, _) => true,
            (Role::Employee, Role::Employee) => true,
            _ => false,
        }
    }

    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "EMPLOYEE",
            Role::Boss => "BOSS",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored role string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EMPLOYEE" => Ok(Role::Employee),
            "BOSS" => Ok(Role::Boss),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// A user account as held by the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: Uuid,
    /// Lower-cased; unique.
    pub email: String,
    /// Unique; separate namespace from `email`.
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub enabled: bool,
    /// SHA-256 hex digest of the pending verification token. `None` once
    /// the account is verified or when it never needed verification.
    pub verification_token_hash: Option<String>,
    /// `None` means the pending token does not expire.
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub labels: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl UserIdentity {
    /// Whether the account still waits for email verification.
    pub fn verification_pending(&self) -> bool {
        self.verification_token_hash.is_some()
    }
}

/// The authenticated identity attached to a request.
///
/// Downstream code takes the acting user from here, never from request
/// bodies or query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub labels: BTreeSet<String>,
}

impl From<&UserIdentity> for Principal {
    fn from(user: &UserIdentity) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            role: user.role,
            labels: user.labels.clone(),
        }
    }
}

/// JWT claims embedded in session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user's email.
    pub sub: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

/// Tokens handed out by a successful login.
#[derive(Debug, Clone)]
pub struct SessionBundle {
    /// Signed bearer token for the `Authorization` header.
    pub session_token: String,
    /// Opaque cached token for URL contexts.
    pub temporary_token: String,
    /// Session token lifetime in seconds.
    pub expires_in: i64,
    pub principal: Principal,
}

/// Result of consuming a verification token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    InvalidToken,
}
