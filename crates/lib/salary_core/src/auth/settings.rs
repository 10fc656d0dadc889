//! Tunables for the auth core.

use std::time::Duration as StdDuration;

use chrono::Duration;
use url::Url;

use super::jwt::DEFAULT_SESSION_TTL_SECS;
use super::temp_tokens::DEFAULT_TEMP_TOKEN_TTL;
use super::verification::DEFAULT_VERIFICATION_TTL_SECS;

/// Settings shared by the orchestrator and the token components.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Session token (JWT) lifetime.
    pub session_ttl: Duration,
    /// Temporary token lifetime.
    pub temporary_ttl: StdDuration,
    /// Verification token lifetime; `None` means pending tokens never expire.
    pub verification_ttl: Option<Duration>,
    /// Endpoint that consumes verification tokens. The token is appended as
    /// the `token` query parameter.
    pub verify_url: Url,
}

impl AuthSettings {
    /// Settings with the verification link rooted at `public_base_url`.
    pub fn with_base_url(public_base_url: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            verify_url: public_base_url.join("/api/auth/verify")?,
            ..Self::default()
        })
    }

    /// Verification link for `token`.
    pub fn verification_link(&self, token: &str) -> Url {
        let mut link = self.verify_url.clone();
        link.query_pairs_mut().append_pair("token", token);
        link
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            temporary_ttl: DEFAULT_TEMP_TOKEN_TTL,
            verification_ttl: Some(Duration::seconds(DEFAULT_VERIFICATION_TTL_SECS)),
            verify_url: Url::parse("http://localhost:8080/api/auth/verify")
                .expect("static verify URL is valid"),
        }
    }
}
