//! Authentication and authorization logic.
//!
//! Provides password hashing, session tokens (JWT), verification tokens,
//! the temporary token cache, the registration/login orchestrator and the
//! per-request authorization gate.

pub mod gate;
pub mod jwt;
pub mod password;
pub mod service;
pub mod settings;
pub mod temp_tokens;
pub mod verification;

use thiserror::Error;

use crate::store::{StoreError, UniqueKey};

pub use gate::AuthorizationGate;
pub use jwt::SessionTokens;
pub use password::{BcryptHasher, PasswordHasher};
pub use service::AuthService;
pub use settings::AuthSettings;
pub use temp_tokens::TemporaryTokenCache;

/// Authentication errors.
///
/// Everything except `Store` and `Internal` is an expected, client-caused
/// outcome.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Username already taken")]
    DuplicateUsername,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account email has not been verified")]
    AccountNotVerified,

    #[error("Authentication required: {0}")]
    AuthenticationFailure(String),

    #[error("Insufficient permissions for this operation")]
    AuthorizationFailure,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConstraintViolation(UniqueKey::Email) => AuthError::DuplicateEmail,
            StoreError::ConstraintViolation(UniqueKey::Username) => AuthError::DuplicateUsername,
            other => AuthError::Store(other),
        }
    }
}

impl AuthError {
    /// Whether this is an infrastructure fault rather than a client error.
    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::Store(_) | AuthError::Internal(_))
    }
}
