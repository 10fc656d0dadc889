//! Account lifecycle: registration, email verification, login and the
//! boss-side account operations.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::gate::AuthorizationGate;
use super::jwt::SessionTokens;
use super::password::PasswordHasher;
use super::settings::AuthSettings;
use super::temp_tokens::TemporaryTokenCache;
use super::{AuthError, verification};
use crate::mail::{MailMessage, MailOutbox};
use crate::models::auth::{Principal, Role, SessionBundle, UserIdentity, VerificationOutcome};
use crate::store::CredentialStore;

const MAX_EMAIL_LEN: usize = 190;
const MAX_USERNAME_LEN: usize = 100;

const VERIFY_SUBJECT: &str = "Verify your Salary System account";

/// Lower-case and trim an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), AuthError> {
    let valid = email.len() <= MAX_EMAIL_LEN
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if valid {
        Ok(())
    } else {
        Err(AuthError::Validation("A valid email address is required".into()))
    }
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(AuthError::Validation(format!(
            "Username must be 1-{MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::Validation("Password is required".into()));
    }
    Ok(())
}

/// Trim, drop empties, dedupe.
pub fn normalize_labels<I, S>(labels: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .map(|l| l.as_ref().trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

pub(crate) fn require_boss(actor: &Principal) -> Result<(), AuthError> {
    if actor.role.has_privilege(Role::Boss) {
        Ok(())
    } else {
        Err(AuthError::AuthorizationFailure)
    }
}

/// Input for [`AuthService::create_employee`].
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub username: String,
    pub email: String,
    pub password: String,
    pub labels: Vec<String>,
}

/// Composes the credential store, password hasher, token engines and mail
/// outbox into the account operations.
///
/// Built once at startup and shared behind an `Arc`.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordHasher>,
    sessions: Arc<SessionTokens>,
    temp_tokens: Arc<TemporaryTokenCache>,
    outbox: MailOutbox,
    settings: AuthSettings,
    /// Serialises every read-modify-write sequence on account state, such as
    /// the first-account role check, token consumption and label updates.
    account_writes: Mutex<()>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordHasher>,
        sessions: Arc<SessionTokens>,
        temp_tokens: Arc<TemporaryTokenCache>,
        outbox: MailOutbox,
        settings: AuthSettings,
    ) -> Self {
        Self {
            store,
            hasher,
            sessions,
            temp_tokens,
            outbox,
            settings,
            account_writes: Mutex::new(()),
        }
    }

    /// Authorization gate sharing this service's store and token engines.
    pub fn gate(&self) -> AuthorizationGate {
        AuthorizationGate::new(
            Arc::clone(&self.store),
            Arc::clone(&self.sessions),
            Arc::clone(&self.temp_tokens),
        )
    }

    pub fn temp_tokens(&self) -> &Arc<TemporaryTokenCache> {
        &self.temp_tokens
    }

    /// Register a self-service account.
    ///
    /// The account starts disabled with a pending verification token, and a
    /// verification mail is queued. The very first account becomes BOSS.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Principal, AuthError> {
        let email = normalize_email(email);
        let username = username.trim();
        validate_email(&email)?;
        validate_username(username)?;
        validate_password(password)?;

        // Fast path only; the store's unique keys are authoritative.
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }
        if self.store.find_by_username(username).await?.is_some() {
            return Err(AuthError::DuplicateUsername);
        }

        let password_hash = self.hasher.hash(password)?;
        let token = verification::generate_token();
        let now = Utc::now();

        let user = {
            let _guard = self.account_writes.lock().await;
            let role = if self.store.count().await? == 0 {
                Role::Boss
            } else {
                Role::Employee
            };
            let user = UserIdentity {
                id: Uuid::now_v7(),
                email,
                username: username.to_string(),
                password_hash,
                role,
                enabled: false,
                verification_token_hash: Some(verification::hash_token(&token)),
                verification_expires_at: verification::expiry_after(
                    now,
                    self.settings.verification_ttl,
                ),
                labels: BTreeSet::new(),
                created_at: now,
            };
            self.store.save(user).await?
        };

        if user.role == Role::Boss {
            info!(email = %user.email, "first account registered as boss");
        }
        info!(user_id = %user.id, email = %user.email, role = %user.role, "registered account");

        self.send_verification_mail(&user.email, &token);
        Ok(Principal::from(&user))
    }

    /// Consume a verification token and enable its account.
    pub async fn verify(&self, token: &str) -> Result<VerificationOutcome, AuthError> {
        if token.is_empty() {
            return Ok(VerificationOutcome::InvalidToken);
        }
        let token_hash = verification::hash_token(token);

        let _guard = self.account_writes.lock().await;
        let Some(mut user) = self.store.find_by_verification_token(&token_hash).await? else {
            debug!("verification token not found");
            return Ok(VerificationOutcome::InvalidToken);
        };
        if !verification::is_live(user.verification_expires_at, Utc::now()) {
            debug!(user_id = %user.id, "verification token expired");
            return Ok(VerificationOutcome::InvalidToken);
        }

        user.enabled = true;
        user.verification_token_hash = None;
        user.verification_expires_at = None;
        let user = self.store.save(user).await?;
        info!(user_id = %user.id, email = %user.email, "email verified");
        Ok(VerificationOutcome::Verified)
    }

    /// Issue a fresh verification token for a pending account and mail it.
    ///
    /// Unknown and already verified addresses succeed without sending
    /// anything, so the response does not reveal which addresses exist.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let token = verification::generate_token();

        let user = {
            let _guard = self.account_writes.lock().await;
            let Some(mut user) = self.store.find_by_email(&email).await? else {
                debug!("resend requested for unknown email");
                return Ok(());
            };
            if user.enabled {
                debug!(user_id = %user.id, "resend requested for verified account");
                return Ok(());
            }
            user.verification_token_hash = Some(verification::hash_token(&token));
            user.verification_expires_at =
                verification::expiry_after(Utc::now(), self.settings.verification_ttl);
            self.store.save(user).await?
        };

        info!(user_id = %user.id, "rotated verification token");
        self.send_verification_mail(&user.email, &token);
        Ok(())
    }

    /// Check credentials and issue a session token plus a temporary token.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionBundle, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.store.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !user.enabled {
            return Err(AuthError::AccountNotVerified);
        }
        if !self.hasher.verify(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let session_token = self.sessions.issue(&user.email)?;
        let temporary_token = self.temp_tokens.issue(&user.email);
        info!(user_id = %user.id, "login succeeded");

        Ok(SessionBundle {
            session_token,
            temporary_token,
            expires_in: self.sessions.ttl().num_seconds(),
            principal: Principal::from(&user),
        })
    }

    /// Revoke a temporary token. Session tokens simply expire.
    pub fn logout(&self, temporary_token: &str) {
        self.temp_tokens.revoke(temporary_token);
    }

    /// Create an enabled EMPLOYEE account directly, skipping verification.
    pub async fn create_employee(
        &self,
        actor: &Principal,
        employee: NewEmployee,
    ) -> Result<Principal, AuthError> {
        require_boss(actor)?;
        let email = normalize_email(&employee.email);
        let username = employee.username.trim();
        validate_email(&email)?;
        validate_username(username)?;
        validate_password(&employee.password)?;

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }
        if self.store.find_by_username(username).await?.is_some() {
            return Err(AuthError::DuplicateUsername);
        }

        let user = UserIdentity {
            id: Uuid::now_v7(),
            email,
            username: username.to_string(),
            password_hash: self.hasher.hash(&employee.password)?,
            role: Role::Employee,
            enabled: true,
            verification_token_hash: None,
            verification_expires_at: None,
            labels: normalize_labels(&employee.labels),
            created_at: Utc::now(),
        };
        let user = self.store.save(user).await?;
        info!(actor = %actor.email, user_id = %user.id, "boss created employee");
        Ok(Principal::from(&user))
    }

    /// EMPLOYEE accounts, optionally only those carrying `label`.
    pub async fn list_employees(
        &self,
        actor: &Principal,
        label: Option<&str>,
    ) -> Result<Vec<Principal>, AuthError> {
        require_boss(actor)?;
        let label = label.map(str::trim).filter(|l| !l.is_empty());
        let users = self.store.list_employees(label).await?;
        Ok(users.iter().map(Principal::from).collect())
    }

    /// Replace the labels of an account.
    pub async fn set_labels(
        &self,
        actor: &Principal,
        user_id: Uuid,
        labels: &[String],
    ) -> Result<Principal, AuthError> {
        require_boss(actor)?;
        let user = {
            let _guard = self.account_writes.lock().await;
            let mut user = self
                .store
                .find_by_id(user_id)
                .await?
                .ok_or_else(|| AuthError::NotFound(format!("user {user_id}")))?;
            user.labels = normalize_labels(labels);
            self.store.save(user).await?
        };
        info!(actor = %actor.email, user_id = %user.id, labels = ?user.labels, "updated labels");
        Ok(Principal::from(&user))
    }

    /// Queue a mail to the principal's own address.
    pub fn mail_principal(&self, principal: &Principal, subject: &str, body: &str) {
        self.outbox.enqueue(MailMessage {
            to: principal.email.clone(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
    }

    fn send_verification_mail(&self, to: &str, token: &str) {
        let link = self.settings.verification_link(token);
        let body = format!(
            "Welcome! Please verify your email by visiting: {link}\n\
             If the link doesn't work, use this token: {token}"
        );
        self.outbox.enqueue(MailMessage {
            to: to.to_string(),
            subject: VERIFY_SUBJECT.to_string(),
            body,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::Duration;
    use tokio::sync::Notify;

    use super::*;
    use crate::auth::password::BcryptHasher;
    use crate::mail::MailWorker;
    use crate::store::{InMemoryCredentialStore, StoreError};

    const SECRET: &str = "service-test-secret-service-test-secret";

    struct Harness {
        service: AuthService,
        store: Arc<InMemoryCredentialStore>,
        mail: MailWorker,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_settings(AuthSettings::default())
        }

        fn with_settings(settings: AuthSettings) -> Self {
            let store = Arc::new(InMemoryCredentialStore::new());
            let (service, mail) = build(store.clone(), settings);
            Self {
                service,
                store,
                mail,
            }
        }

        /// Pull the token out of the next queued verification mail.
        fn next_token(&mut self) -> String {
            next_token(&mut self.mail)
        }

        async fn user(&self, email: &str) -> UserIdentity {
            self.store.find_by_email(email).await.unwrap().unwrap()
        }
    }

    fn next_token(mail: &mut MailWorker) -> String {
        let message = mail.try_next().expect("verification mail queued");
        assert_eq!(message.subject, VERIFY_SUBJECT);
        message
            .body
            .rsplit("use this token: ")
            .next()
            .expect("token in body")
            .trim()
            .to_string()
    }

    fn build(store: Arc<dyn CredentialStore>, settings: AuthSettings) -> (AuthService, MailWorker) {
        let (outbox, mail) = MailOutbox::channel();
        let service = AuthService::new(
            store,
            Arc::new(BcryptHasher::new(4)),
            Arc::new(SessionTokens::new(SECRET, settings.session_ttl)),
            Arc::new(TemporaryTokenCache::new(settings.temporary_ttl)),
            outbox,
            settings,
        );
        (service, mail)
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let mut h = Harness::new();

        let alice = h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        assert_eq!(alice.role, Role::Boss);
        assert_eq!(h.store.count().await.unwrap(), 1);
        let stored = h.user("alice@x.com").await;
        assert!(!stored.enabled);
        assert!(stored.verification_pending());
        let alice_token = h.next_token();

        let bob = h.service.register("bob", "bob@x.com", "pw2").await.unwrap();
        assert_eq!(bob.role, Role::Employee);
        let _bob_token = h.next_token();

        assert_eq!(
            h.service.verify(&alice_token).await.unwrap(),
            VerificationOutcome::Verified
        );

        let bundle = h.service.login("alice@x.com", "pw1").await.unwrap();
        assert_eq!(
            h.service.gate().authorize(&bundle.session_token, None).await.unwrap().email,
            "alice@x.com"
        );
        assert_eq!(
            h.service
                .temp_tokens()
                .validate_and_get_subject(&bundle.temporary_token)
                .as_deref(),
            Some("alice@x.com")
        );
        assert_eq!(bundle.expires_in, 24 * 60 * 60);

        let err = h.service.login("bob@x.com", "pw2").await.unwrap_err();
        assert!(matches!(err, AuthError::AccountNotVerified));
    }

    #[tokio::test]
    async fn register_stores_only_token_digest_and_queues_one_mail() {
        let mut h = Harness::new();
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let token = h.next_token();
        assert!(h.mail.try_next().is_none());

        let stored = h.user("alice@x.com").await;
        assert_eq!(
            stored.verification_token_hash.as_deref(),
            Some(verification::hash_token(&token).as_str())
        );
        assert_ne!(stored.password_hash, "pw1");
        assert!(stored.verification_expires_at.is_some());
    }

    #[tokio::test]
    async fn verification_link_points_at_verify_endpoint() {
        let mut h = Harness::new();
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let message = h.mail.try_next().unwrap();
        assert_eq!(message.to, "alice@x.com");
        assert!(
            message
                .body
                .contains("http://localhost:8080/api/auth/verify?token=")
        );
    }

    #[tokio::test]
    async fn duplicate_email_is_case_insensitive() {
        let h = Harness::new();
        h.service.register("alice", "Alice@X.com", "pw1").await.unwrap();
        assert_eq!(h.user("alice@x.com").await.email, "alice@x.com");
        let err = h
            .service
            .register("someone-else", "ALICE@x.COM", "pw1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
        assert_eq!(h.store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let mut h = Harness::new();
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let _ = h.next_token();
        let err = h
            .service
            .register("alice", "other@x.com", "pw1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUsername));
        assert!(h.mail.try_next().is_none());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_write() {
        let h = Harness::new();
        for (username, email, password) in [
            ("", "a@x.com", "pw"),
            ("a", "not-an-email", "pw"),
            ("a", "a@x.com", ""),
        ] {
            let err = h.service.register(username, email, password).await.unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)));
        }
        assert_eq!(h.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn verify_is_single_use() {
        let mut h = Harness::new();
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let token = h.next_token();

        assert_eq!(
            h.service.verify(&token).await.unwrap(),
            VerificationOutcome::Verified
        );
        let stored = h.user("alice@x.com").await;
        assert!(stored.enabled);
        assert!(!stored.verification_pending());

        assert_eq!(
            h.service.verify(&token).await.unwrap(),
            VerificationOutcome::InvalidToken
        );
    }

    #[tokio::test]
    async fn unknown_or_empty_token_is_invalid() {
        let h = Harness::new();
        assert_eq!(
            h.service.verify("nope").await.unwrap(),
            VerificationOutcome::InvalidToken
        );
        assert_eq!(
            h.service.verify("").await.unwrap(),
            VerificationOutcome::InvalidToken
        );
    }

    #[tokio::test]
    async fn expired_verification_token_is_invalid() {
        let mut settings = AuthSettings::default();
        settings.verification_ttl = Some(Duration::seconds(-1));
        let mut h = Harness::with_settings(settings);
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let stale = h.next_token();
        assert_eq!(
            h.service.verify(&stale).await.unwrap(),
            VerificationOutcome::InvalidToken
        );
        assert!(!h.user("alice@x.com").await.enabled);
    }

    #[tokio::test]
    async fn verification_token_without_ttl_never_expires() {
        let mut settings = AuthSettings::default();
        settings.verification_ttl = None;
        let mut h = Harness::with_settings(settings);
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        assert!(h.user("alice@x.com").await.verification_expires_at.is_none());
        let token = h.next_token();
        assert_eq!(
            h.service.verify(&token).await.unwrap(),
            VerificationOutcome::Verified
        );
    }

    #[tokio::test]
    async fn resend_rotates_token() {
        let mut h = Harness::new();
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let first = h.next_token();

        h.service.resend_verification("ALICE@x.com").await.unwrap();
        let second = h.next_token();
        assert_ne!(first, second);

        assert_eq!(
            h.service.verify(&first).await.unwrap(),
            VerificationOutcome::InvalidToken
        );
        assert_eq!(
            h.service.verify(&second).await.unwrap(),
            VerificationOutcome::Verified
        );
    }

    #[tokio::test]
    async fn resend_is_silent_for_unknown_and_verified_accounts() {
        let mut h = Harness::new();
        h.service.resend_verification("ghost@x.com").await.unwrap();
        assert!(h.mail.try_next().is_none());

        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let token = h.next_token();
        h.service.verify(&token).await.unwrap();
        h.service.resend_verification("alice@x.com").await.unwrap();
        assert!(h.mail.try_next().is_none());
    }

    #[tokio::test]
    async fn login_failures_do_not_reveal_which_part_was_wrong() {
        let mut h = Harness::new();
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let token = h.next_token();
        h.service.verify(&token).await.unwrap();

        let unknown = h.service.login("nobody@x.com", "pw1").await.unwrap_err();
        let wrong = h.service.login("alice@x.com", "wrong").await.unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn login_normalizes_email_and_leaves_account_untouched() {
        let mut h = Harness::new();
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let token = h.next_token();
        h.service.verify(&token).await.unwrap();
        let before = h.user("alice@x.com").await;

        let bundle = h.service.login("  Alice@X.com ", "pw1").await.unwrap();
        assert_eq!(bundle.principal.email, "alice@x.com");
        assert_eq!(h.user("alice@x.com").await, before);
    }

    #[tokio::test]
    async fn logout_revokes_temporary_token_only() {
        let mut h = Harness::new();
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let token = h.next_token();
        h.service.verify(&token).await.unwrap();
        let bundle = h.service.login("alice@x.com", "pw1").await.unwrap();

        h.service.logout(&bundle.temporary_token);
        h.service.logout(&bundle.temporary_token);
        let gate = h.service.gate();
        assert!(gate.authorize_temporary(&bundle.temporary_token, None).await.is_err());
        assert!(gate.authorize(&bundle.session_token, None).await.is_ok());
    }

    #[tokio::test]
    async fn temporary_token_expires_with_configured_ttl() {
        let mut settings = AuthSettings::default();
        settings.temporary_ttl = StdDuration::from_millis(20);
        let mut h = Harness::with_settings(settings);
        h.service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let token = h.next_token();
        h.service.verify(&token).await.unwrap();
        let bundle = h.service.login("alice@x.com", "pw1").await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(40)).await;
        assert_eq!(
            h.service
                .temp_tokens()
                .validate_and_get_subject(&bundle.temporary_token),
            None
        );
    }

    async fn boss_principal(h: &mut Harness) -> Principal {
        let boss = h.service.register("boss", "boss@x.com", "pw").await.unwrap();
        let token = h.next_token();
        h.service.verify(&token).await.unwrap();
        boss
    }

    fn new_employee(username: &str, email: &str, labels: &[&str]) -> NewEmployee {
        NewEmployee {
            username: username.into(),
            email: email.into(),
            password: "secret".into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn boss_created_employee_is_enabled_without_mail() {
        let mut h = Harness::new();
        let boss = boss_principal(&mut h).await;

        let cook = h
            .service
            .create_employee(&boss, new_employee("cook", "Cook@x.com", &[" kitchen ", "", "kitchen"]))
            .await
            .unwrap();
        assert_eq!(cook.role, Role::Employee);
        assert_eq!(cook.labels, BTreeSet::from(["kitchen".to_string()]));
        assert!(h.mail.try_next().is_none());

        let stored = h.user("cook@x.com").await;
        assert!(stored.enabled);
        assert!(!stored.verification_pending());
        assert!(h.service.login("cook@x.com", "secret").await.is_ok());
    }

    #[tokio::test]
    async fn employees_cannot_use_boss_operations() {
        let mut h = Harness::new();
        let boss = boss_principal(&mut h).await;
        let cook = h
            .service
            .create_employee(&boss, new_employee("cook", "cook@x.com", &[]))
            .await
            .unwrap();

        let err = h
            .service
            .create_employee(&cook, new_employee("x", "x@x.com", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthorizationFailure));
        assert!(matches!(
            h.service.list_employees(&cook, None).await,
            Err(AuthError::AuthorizationFailure)
        ));
        assert!(matches!(
            h.service.set_labels(&cook, cook.id, &[]).await,
            Err(AuthError::AuthorizationFailure)
        ));
    }

    #[tokio::test]
    async fn boss_creation_respects_uniqueness() {
        let mut h = Harness::new();
        let boss = boss_principal(&mut h).await;
        let err = h
            .service
            .create_employee(&boss, new_employee("other", "BOSS@x.com", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
        let err = h
            .service
            .create_employee(&boss, new_employee("boss", "new@x.com", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUsername));
    }

    #[tokio::test]
    async fn labels_filter_and_update() {
        let mut h = Harness::new();
        let boss = boss_principal(&mut h).await;
        let cook = h
            .service
            .create_employee(&boss, new_employee("cook", "cook@x.com", &["kitchen"]))
            .await
            .unwrap();
        h.service
            .create_employee(&boss, new_employee("driver", "driver@x.com", &["road"]))
            .await
            .unwrap();

        assert_eq!(h.service.list_employees(&boss, None).await.unwrap().len(), 2);
        let kitchen = h.service.list_employees(&boss, Some("kitchen")).await.unwrap();
        assert_eq!(kitchen.len(), 1);
        assert_eq!(kitchen[0].username, "cook");

        let updated = h
            .service
            .set_labels(&boss, cook.id, &["road".to_string(), "night".to_string()])
            .await
            .unwrap();
        assert_eq!(updated.labels.len(), 2);
        assert_eq!(h.service.list_employees(&boss, Some("road")).await.unwrap().len(), 2);

        let err = h
            .service
            .set_labels(&boss, Uuid::now_v7(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn mail_principal_targets_principal_address() {
        let mut h = Harness::new();
        let boss = boss_principal(&mut h).await;
        h.service.mail_principal(&boss, "Hello", "Body");
        let message = h.mail.try_next().unwrap();
        assert_eq!(message.to, "boss@x.com");
        assert_eq!(message.subject, "Hello");
    }

    #[tokio::test]
    async fn register_succeeds_when_mail_worker_is_gone() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let (service, mail) = build(store.clone(), AuthSettings::default());
        drop(mail);
        service.register("alice", "alice@x.com", "pw1").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_registrations_elect_exactly_one_boss() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let (service, _mail) = build(store.clone(), AuthSettings::default());
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .register(&format!("user{i}"), &format!("user{i}@x.com"), "pw")
                        .await
                })
            })
            .collect();
        let mut bosses = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().role == Role::Boss {
                bosses += 1;
            }
        }
        assert_eq!(bosses, 1);
        assert_eq!(store.count().await.unwrap(), 8);
    }

    /// Store whose lookups always miss, as if a concurrent request raced
    /// past the pre-check; only `save` sees the real data.
    struct RacingStore(InMemoryCredentialStore);

    #[async_trait]
    impl CredentialStore for RacingStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<UserIdentity>, StoreError> {
            self.0.find_by_id(id).await
        }
        async fn find_by_email(&self, _: &str) -> Result<Option<UserIdentity>, StoreError> {
            Ok(None)
        }
        async fn find_by_username(&self, _: &str) -> Result<Option<UserIdentity>, StoreError> {
            Ok(None)
        }
        async fn find_by_verification_token(
            &self,
            token_hash: &str,
        ) -> Result<Option<UserIdentity>, StoreError> {
            self.0.find_by_verification_token(token_hash).await
        }
        async fn count(&self) -> Result<u64, StoreError> {
            self.0.count().await
        }
        async fn list_employees(
            &self,
            label: Option<&str>,
        ) -> Result<Vec<UserIdentity>, StoreError> {
            self.0.list_employees(label).await
        }
        async fn save(&self, identity: UserIdentity) -> Result<UserIdentity, StoreError> {
            self.0.save(identity).await
        }
    }

    #[tokio::test]
    async fn store_constraint_violation_maps_to_duplicate_errors() {
        let store = Arc::new(RacingStore(InMemoryCredentialStore::new()));
        let (service, _mail) = build(store, AuthSettings::default());
        service.register("alice", "alice@x.com", "pw1").await.unwrap();

        let err = service.register("bob", "alice@x.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
        let err = service.register("alice", "bob@x.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUsername));
    }

    /// Store whose `find_by_id` reads, then parks until released, leaving a
    /// window for other writers between the read and the caller's save.
    struct ParkingStore {
        inner: InMemoryCredentialStore,
        parked: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CredentialStore for ParkingStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<UserIdentity>, StoreError> {
            let found = self.inner.find_by_id(id).await;
            self.parked.notify_one();
            self.release.notified().await;
            found
        }
        async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, StoreError> {
            self.inner.find_by_email(email).await
        }
        async fn find_by_username(
            &self,
            username: &str,
        ) -> Result<Option<UserIdentity>, StoreError> {
            self.inner.find_by_username(username).await
        }
        async fn find_by_verification_token(
            &self,
            token_hash: &str,
        ) -> Result<Option<UserIdentity>, StoreError> {
            self.inner.find_by_verification_token(token_hash).await
        }
        async fn count(&self) -> Result<u64, StoreError> {
            self.inner.count().await
        }
        async fn list_employees(
            &self,
            label: Option<&str>,
        ) -> Result<Vec<UserIdentity>, StoreError> {
            self.inner.list_employees(label).await
        }
        async fn save(&self, identity: UserIdentity) -> Result<UserIdentity, StoreError> {
            self.inner.save(identity).await
        }
    }

    #[tokio::test]
    async fn label_update_cannot_undo_a_concurrent_verification() {
        let store = Arc::new(ParkingStore {
            inner: InMemoryCredentialStore::new(),
            parked: Notify::new(),
            release: Notify::new(),
        });
        let (service, mut mail) = build(store.clone(), AuthSettings::default());
        let service = Arc::new(service);

        let boss = service.register("boss", "boss@x.com", "pw").await.unwrap();
        let _ = next_token(&mut mail);
        let alice = service.register("alice", "alice@x.com", "pw1").await.unwrap();
        let token = next_token(&mut mail);

        let relabel = tokio::spawn({
            let service = Arc::clone(&service);
            async move {
                service
                    .set_labels(&boss, alice.id, &["night".to_string()])
                    .await
            }
        });
        store.parked.notified().await;

        let mut verify = tokio::spawn({
            let service = Arc::clone(&service);
            let token = token.clone();
            async move { service.verify(&token).await }
        });
        assert!(
            tokio::time::timeout(StdDuration::from_millis(50), &mut verify)
                .await
                .is_err(),
            "verification must wait for the label update"
        );

        store.release.notify_one();
        relabel.await.unwrap().unwrap();
        assert_eq!(verify.await.unwrap().unwrap(), VerificationOutcome::Verified);

        let stored = store.inner.find_by_email("alice@x.com").await.unwrap().unwrap();
        assert!(stored.enabled);
        assert!(!stored.verification_pending());
        assert!(stored.labels.contains("night"));
        assert_eq!(
            service.verify(&token).await.unwrap(),
            VerificationOutcome::InvalidToken
        );
    }

    /// Store that is unreachable.
    struct DownStore;

    #[async_trait]
    impl CredentialStore for DownStore {
        async fn find_by_id(&self, _: Uuid) -> Result<Option<UserIdentity>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn find_by_email(&self, _: &str) -> Result<Option<UserIdentity>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn find_by_username(&self, _: &str) -> Result<Option<UserIdentity>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn find_by_verification_token(
            &self,
            _: &str,
        ) -> Result<Option<UserIdentity>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn count(&self) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn list_employees(&self, _: Option<&str>) -> Result<Vec<UserIdentity>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn save(&self, _: UserIdentity) -> Result<UserIdentity, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_internal_error() {
        let (service, _mail) = build(Arc::new(DownStore), AuthSettings::default());
        assert!(service.login("a@x.com", "pw").await.unwrap_err().is_internal());
        assert!(service.verify("t").await.unwrap_err().is_internal());
        assert!(
            service
                .register("a", "a@x.com", "pw")
                .await
                .unwrap_err()
                .is_internal()
        );
    }
}
