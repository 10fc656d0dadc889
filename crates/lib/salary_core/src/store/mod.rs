//! Persistence: user identities plus attendance, salary and public item
//! records.
//!
//! The auth core only talks to the [`CredentialStore`] trait. Uniqueness of
//! email and username is enforced by the store itself; callers may pre-check
//! but must treat [`StoreError::ConstraintViolation`] as authoritative.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::UserIdentity;
use crate::models::workplace::{Attendance, PayPeriod, PublicItem, SalaryRecord};

pub use memory::{InMemoryCredentialStore, InMemoryWorkplaceStore};
pub use postgres::{PgCredentialStore, PgWorkplaceStore};

/// Unique key that a write collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    Email,
    Username,
}

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated on {0:?}")]
    ConstraintViolation(UniqueKey),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Lookup and persistence of user identities.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserIdentity>, StoreError>;

    /// `email` must already be lower-cased.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, StoreError>;

    async fn find_by_username(&self, username: &str)
    -> Result<Option<UserIdentity>, StoreError>;

    /// Look up the pending identity whose verification token digest matches.
    async fn find_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<UserIdentity>, StoreError>;

    /// Total number of identities ever stored.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Identities with role EMPLOYEE, optionally restricted to one label,
    /// ordered by creation time.
    async fn list_employees(&self, label: Option<&str>) -> Result<Vec<UserIdentity>, StoreError>;

    /// Insert or update by `id`. Fails with
    /// [`StoreError::ConstraintViolation`] when another identity already
    /// owns the email or username.
    async fn save(&self, identity: UserIdentity) -> Result<UserIdentity, StoreError>;
}

/// Attendance, salary and public item records.
#[async_trait]
pub trait WorkplaceStore: Send + Sync {
    async fn record_attendance(&self, attendance: Attendance) -> Result<Attendance, StoreError>;

    /// Attendances of `user_id` with `from <= check_in_time < until`, oldest
    /// first.
    async fn attendances_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Attendance>, StoreError>;

    /// Insert or replace the record for its account and month.
    async fn save_salary(&self, record: SalaryRecord) -> Result<SalaryRecord, StoreError>;

    /// Salary records of `user_id`, newest month first.
    async fn salaries(
        &self,
        user_id: Uuid,
        period: Option<PayPeriod>,
    ) -> Result<Vec<SalaryRecord>, StoreError>;

    async fn create_public_item(&self, item: PublicItem) -> Result<PublicItem, StoreError>;

    /// Every public item, newest first.
    async fn public_items(&self) -> Result<Vec<PublicItem>, StoreError>;
}
