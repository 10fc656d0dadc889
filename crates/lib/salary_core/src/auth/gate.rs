//! Per-request authorization.
//!
//! Resolves the caller from a token, loads the identity and checks the
//! required role. Authentication failures (bad token, unknown subject) are
//! always reported before any role check runs.

use std::sync::Arc;

use tracing::debug;

use super::AuthError;
use super::jwt::SessionTokens;
use super::temp_tokens::TemporaryTokenCache;
use crate::models::auth::{Principal, Role};
use crate::store::CredentialStore;

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or_else(|| {
        AuthError::AuthenticationFailure("Missing authorization header".into())
    })?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::AuthenticationFailure("Invalid authorization scheme".into()))?
        .trim();
    if token.is_empty() {
        return Err(AuthError::AuthenticationFailure("Empty bearer token".into()));
    }
    Ok(token)
}

#[derive(Clone)]
pub struct AuthorizationGate {
    store: Arc<dyn CredentialStore>,
    sessions: Arc<SessionTokens>,
    temp_tokens: Arc<TemporaryTokenCache>,
}

impl AuthorizationGate {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: Arc<SessionTokens>,
        temp_tokens: Arc<TemporaryTokenCache>,
    ) -> Self {
        Self {
            store,
            sessions,
            temp_tokens,
        }
    }

    /// Authorize a session token (JWT).
    pub async fn authorize(
        &self,
        token: &str,
        required: Option<Role>,
    ) -> Result<Principal, AuthError> {
        let subject = self.sessions.validate(token).ok_or_else(|| {
            AuthError::AuthenticationFailure("Invalid or expired token".into())
        })?;
        self.resolve(&subject, required).await
    }

    /// Authorize straight from an `Authorization` header value.
    pub async fn authorize_header(
        &self,
        header: Option<&str>,
        required: Option<Role>,
    ) -> Result<Principal, AuthError> {
        let token = bearer_token(header)?;
        self.authorize(token, required).await
    }

    /// Authorize a temporary token from the cache.
    pub async fn authorize_temporary(
        &self,
        token: &str,
        required: Option<Role>,
    ) -> Result<Principal, AuthError> {
        let subject = self.temp_tokens.validate_and_get_subject(token).ok_or_else(|| {
            AuthError::AuthenticationFailure("Invalid or expired temporary token".into())
        })?;
        self.resolve(&subject, required).await
    }

    async fn resolve(&self, subject: &str, required: Option<Role>) -> Result<Principal, AuthError> {
        let user = self.store.find_by_email(subject).await?.ok_or_else(|| {
            debug!(subject, "token subject has no account");
            AuthError::AuthenticationFailure("Unknown account".into())
        })?;
        if !user.enabled {
            debug!(user_id = %user.id, "token subject is disabled");
            return Err(AuthError::AuthenticationFailure("Account disabled".into()));
        }
        if let Some(required) = required
            && !user.role.has_privilege(required)
        {
            debug!(user_id = %user.id, role = %user.role, %required, "role check failed");
            return Err(AuthError::AuthorizationFailure);
        }
        Ok(Principal::from(&user))
    }
}
