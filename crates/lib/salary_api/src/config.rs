//! API server configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;
use salary_core::auth::{AuthError, AuthSettings};
use salary_core::auth::jwt::{default_secret_path, load_or_generate_secret};
use salary_core::auth::temp_tokens::MAX_TEMP_TOKEN_TTL;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },

    #[error("Could not load signing secret: {0}")]
    Secret(#[from] AuthError),
}

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL; `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Token lifetimes and the verification link base.
    pub auth: AuthSettings,
    /// Mail relay endpoint; `None` logs mail instead of sending it.
    pub mail_webhook_url: Option<Url>,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .field("jwt_secret", &"<redacted>")
            .field("auth", &self.auth)
            .field("mail_webhook_url", &self.mail_webhook_url)
            .finish()
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                      | Default                               |
    /// |-------------------------------|---------------------------------------|
    /// | `BIND_ADDR`                   | `127.0.0.1:8080`                      |
    /// | `DATABASE_URL`                | unset (in-memory store)               |
    /// | `JWT_SECRET` / `AUTH_SECRET`  | generated & persisted to file         |
    /// | `SESSION_TOKEN_TTL_SECS`      | `86400`                               |
    /// | `TEMP_TOKEN_TTL_SECS`         | `600` (0 = default)                   |
    /// | `VERIFICATION_TOKEN_TTL_SECS` | `86400` (0 = never expires)           |
    /// | `PUBLIC_BASE_URL`             | `http://localhost:8080`               |
    /// | `MAIL_WEBHOOK_URL`            | unset (mail is logged only)           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let session_secs: i64 = parse(&var, "SESSION_TOKEN_TTL_SECS", 86_400)?;
        if session_secs <= 0 {
            return Err(invalid("SESSION_TOKEN_TTL_SECS", "must be positive"));
        }
        let session_ttl = bounded_ttl("SESSION_TOKEN_TTL_SECS", session_secs)?;
        let temp_secs: u64 = parse(&var, "TEMP_TOKEN_TTL_SECS", 600)?;
        if temp_secs > MAX_TEMP_TOKEN_TTL.as_secs() {
            return Err(invalid(
                "TEMP_TOKEN_TTL_SECS",
                format!("must be at most {}", MAX_TEMP_TOKEN_TTL.as_secs()),
            ));
        }
        let verification_secs: i64 = parse(&var, "VERIFICATION_TOKEN_TTL_SECS", 86_400)?;
        if verification_secs < 0 {
            return Err(invalid("VERIFICATION_TOKEN_TTL_SECS", "must not be negative"));
        }
        let verification_ttl = bounded_ttl("VERIFICATION_TOKEN_TTL_SECS", verification_secs)?;

        let mut auth = match parse_url(&var, "PUBLIC_BASE_URL")? {
            Some(base) => AuthSettings::with_base_url(&base)
                .map_err(|e| invalid("PUBLIC_BASE_URL", e.to_string()))?,
            None => AuthSettings::default(),
        };
        auth.session_ttl = session_ttl;
        auth.temporary_ttl = StdDuration::from_secs(temp_secs);
        auth.verification_ttl = (verification_secs > 0).then_some(verification_ttl);

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".into()),
            database_url: var("DATABASE_URL"),
            jwt_secret: resolve_jwt_secret(&var)?,
            auth,
            mail_webhook_url: parse_url(&var, "MAIL_WEBHOOK_URL")?,
        })
    }
}

/// `JWT_SECRET`, then `AUTH_SECRET`, then a secret generated once and
/// persisted under the user data directory.
fn resolve_jwt_secret(var: &impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    if let Some(secret) = var("JWT_SECRET") {
        return Ok(secret);
    }
    if let Some(secret) = var("AUTH_SECRET") {
        return Ok(secret);
    }
    Ok(load_or_generate_secret(&default_secret_path())?)
}

/// Upper bound for session and verification lifetimes: ten years.
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

fn bounded_ttl(name: &'static str, secs: i64) -> Result<Duration, ConfigError> {
    if secs > MAX_TTL_SECS {
        return Err(invalid(name, format!("must be at most {MAX_TTL_SECS}")));
    }
    Duration::try_seconds(secs).ok_or_else(|| invalid(name, "out of range"))
}

fn parse<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(name, e.to_string())),
        None => Ok(default),
    }
}

fn parse_url(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Url>, ConfigError> {
    var(name)
        .map(|raw| Url::parse(raw.trim()).map_err(|e| invalid(name, e.to_string())))
        .transpose()
}

fn invalid(var: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
        assert!(cfg.database_url.is_none());
        assert!(cfg.mail_webhook_url.is_none());
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.auth.session_ttl, Duration::hours(24));
        assert_eq!(cfg.auth.temporary_ttl, StdDuration::from_secs(600));
        assert_eq!(cfg.auth.verification_ttl, Some(Duration::hours(24)));
        assert_eq!(
            cfg.auth.verify_url.as_str(),
            "http://localhost:8080/api/auth/verify"
        );
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("AUTH_SECRET", "fallback"),
            ("BIND_ADDR", "0.0.0.0:9000"),
            ("DATABASE_URL", "postgres://db/salary"),
            ("SESSION_TOKEN_TTL_SECS", "60"),
            ("TEMP_TOKEN_TTL_SECS", "30"),
            ("VERIFICATION_TOKEN_TTL_SECS", "0"),
            ("PUBLIC_BASE_URL", "https://pay.example.com"),
            ("MAIL_WEBHOOK_URL", "http://relay.local/send"),
        ])
        .unwrap();
        assert_eq!(cfg.jwt_secret, "fallback");
        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://db/salary"));
        assert_eq!(cfg.auth.session_ttl, Duration::seconds(60));
        assert_eq!(cfg.auth.temporary_ttl, StdDuration::from_secs(30));
        assert_eq!(cfg.auth.verification_ttl, None);
        assert_eq!(
            cfg.auth.verify_url.as_str(),
            "https://pay.example.com/api/auth/verify"
        );
        assert!(cfg.mail_webhook_url.is_some());
    }

    #[test]
    fn jwt_secret_wins_over_auth_secret() {
        let cfg = config(&[("JWT_SECRET", "primary"), ("AUTH_SECRET", "fallback")]).unwrap();
        assert_eq!(cfg.jwt_secret, "primary");
    }

    #[test]
    fn invalid_values_name_the_variable() {
        for (name, value) in [
            ("SESSION_TOKEN_TTL_SECS", "soon"),
            ("SESSION_TOKEN_TTL_SECS", "0"),
            ("TEMP_TOKEN_TTL_SECS", "-1"),
            ("VERIFICATION_TOKEN_TTL_SECS", "-5"),
            ("PUBLIC_BASE_URL", "not a url"),
        ] {
            let err = config(&[("JWT_SECRET", "x"), (name, value)]).unwrap_err();
            assert!(err.to_string().contains(name), "{err}");
        }
    }

    #[test]
    fn oversized_lifetimes_are_rejected() {
        for name in [
            "SESSION_TOKEN_TTL_SECS",
            "TEMP_TOKEN_TTL_SECS",
            "VERIFICATION_TOKEN_TTL_SECS",
        ] {
            let err = config(&[("JWT_SECRET", "x"), (name, "9223372036854775807")]).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { var, .. } if var == name), "{err}");
        }
        let cfg = config(&[("JWT_SECRET", "x"), ("SESSION_TOKEN_TTL_SECS", "315360000")]).unwrap();
        assert_eq!(cfg.auth.session_ttl, Duration::days(3650));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let cfg = config(&[("JWT_SECRET", "do-not-print")]).unwrap();
        assert!(!format!("{cfg:?}").contains("do-not-print"));
    }
}
