//! In-process stores.
//!
//! Used when no database is configured and throughout the test suites.
//! The write lock is held across the uniqueness check and the insert, so
//! concurrent saves cannot both claim the same email or username.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CredentialStore, StoreError, UniqueKey, WorkplaceStore};
use crate::models::auth::{Role, UserIdentity};
use crate::models::workplace::{Attendance, PayPeriod, PublicItem, SalaryRecord};

/// `HashMap`-backed store keyed by identity id.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<Uuid, UserIdentity>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserIdentity>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<UserIdentity>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.verification_token_hash.as_deref() == Some(token_hash))
            .cloned())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.users.read().await.len() as u64)
    }

    async fn list_employees(&self, label: Option<&str>) -> Result<Vec<UserIdentity>, StoreError> {
        let users = self.users.read().await;
        let mut employees: Vec<UserIdentity> = users
            .values()
            .filter(|u| u.role == Role::Employee)
            .filter(|u| label.is_none_or(|l| u.labels.contains(l)))
            .cloned()
            .collect();
        employees.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(employees)
    }

    async fn save(&self, identity: UserIdentity) -> Result<UserIdentity, StoreError> {
        let mut users = self.users.write().await;
        for other in users.values().filter(|u| u.id != identity.id) {
            if other.email == identity.email {
                return Err(StoreError::ConstraintViolation(UniqueKey::Email));
            }
            if other.username == identity.username {
                return Err(StoreError::ConstraintViolation(UniqueKey::Username));
            }
        }
        users.insert(identity.id, identity.clone());
        Ok(identity)
    }
}

/// `Vec`-backed attendance, salary and public item records.
#[derive(Debug, Default)]
pub struct InMemoryWorkplaceStore {
    attendances: RwLock<Vec<Attendance>>,
    salaries: RwLock<Vec<SalaryRecord>>,
    items: RwLock<Vec<PublicItem>>,
}

impl InMemoryWorkplaceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkplaceStore for InMemoryWorkplaceStore {
    async fn record_attendance(&self, attendance: Attendance) -> Result<Attendance, StoreError> {
        self.attendances.write().await.push(attendance.clone());
        Ok(attendance)
    }

    async fn attendances_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Attendance>, StoreError> {
        let attendances = self.attendances.read().await;
        let mut found: Vec<Attendance> = attendances
            .iter()
            .filter(|a| a.user_id == user_id && from <= a.check_in_time && a.check_in_time < until)
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.check_in_time, a.id));
        Ok(found)
    }

    async fn save_salary(&self, record: SalaryRecord) -> Result<SalaryRecord, StoreError> {
        let mut salaries = self.salaries.write().await;
        salaries.retain(|r| {
            !(r.user_id == record.user_id && r.year == record.year && r.month == record.month)
        });
        salaries.push(record.clone());
        Ok(record)
    }

    async fn salaries(
        &self,
        user_id: Uuid,
        period: Option<PayPeriod>,
    ) -> Result<Vec<SalaryRecord>, StoreError> {
        let salaries = self.salaries.read().await;
        let mut found: Vec<SalaryRecord> = salaries
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| period.is_none_or(|p| r.year == p.year && r.month == p.month))
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.year, b.month).cmp(&(a.year, a.month)));
        Ok(found)
    }

    async fn create_public_item(&self, item: PublicItem) -> Result<PublicItem, StoreError> {
        self.items.write().await.push(item.clone());
        Ok(item)
    }

    async fn public_items(&self) -> Result<Vec<PublicItem>, StoreError> {
        let mut items = self.items.read().await.clone();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(items)
    }
}
