//! Attendance, salary and public item operations.
//!
//! The acting account always comes from the authenticated [`Principal`];
//! employees only ever see their own attendances and salaries.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::auth::service::require_boss;
use crate::models::auth::Principal;
use crate::models::workplace::{Attendance, ItemKind, PayPeriod, PublicItem, SalaryRecord};
use crate::store::WorkplaceStore;

/// Input for [`WorkplaceService::create_public_item`].
#[derive(Debug, Clone, Default)]
pub struct NewPublicItem {
    pub title: String,
    pub description: Option<String>,
    pub kind: Option<ItemKind>,
    pub hourly_rate_cents: Option<i64>,
    pub fixed_amount_cents: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

pub struct WorkplaceService {
    store: Arc<dyn WorkplaceStore>,
}

impl WorkplaceService {
    pub fn new(store: Arc<dyn WorkplaceStore>) -> Self {
        Self { store }
    }

    /// Record a clock-in for `principal` at the current time.
    pub async fn clock_in(&self, principal: &Principal) -> Result<Attendance, AuthError> {
        let attendance = Attendance {
            id: Uuid::now_v7(),
            user_id: principal.id,
            check_in_time: Utc::now(),
        };
        let attendance = self.store.record_attendance(attendance).await?;
        info!(user_id = %principal.id, "clocked in");
        Ok(attendance)
    }

    /// Attendances of `principal` from the start of `start` through the end
    /// of `end`, both UTC days inclusive.
    pub async fn attendances(
        &self,
        principal: &Principal,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Attendance>, AuthError> {
        if end < start {
            return Err(AuthError::Validation("end must not be before start".into()));
        }
        let until = end
            .succ_opt()
            .ok_or_else(|| AuthError::Validation("end is out of range".into()))?;
        let attendances = self
            .store
            .attendances_between(principal.id, start_of_day(start), start_of_day(until))
            .await?;
        Ok(attendances)
    }

    /// Salary records of `principal`. The filter applies only when both
    /// `year` and `month` are given.
    pub async fn salaries(
        &self,
        principal: &Principal,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<Vec<SalaryRecord>, AuthError> {
        let period = match (year, month) {
            (Some(year), Some(month)) => Some(
                PayPeriod::new(year, month)
                    .ok_or_else(|| AuthError::Validation("month must be 1-12".into()))?,
            ),
            _ => None,
        };
        Ok(self.store.salaries(principal.id, period).await?)
    }

    /// Public items that are active and not past their end date, newest
    /// first.
    pub async fn public_items(&self) -> Result<Vec<PublicItem>, AuthError> {
        let now = Utc::now();
        let items = self.store.public_items().await?;
        Ok(items.into_iter().filter(|item| item.is_open(now)).collect())
    }

    /// Post a new public item. BOSS only.
    pub async fn create_public_item(
        &self,
        actor: &Principal,
        new: NewPublicItem,
    ) -> Result<PublicItem, AuthError> {
        require_boss(actor)?;
        let title = new.title.trim();
        if title.is_empty() {
            return Err(AuthError::Validation("Title is required".into()));
        }
        if new.hourly_rate_cents.is_some_and(|c| c < 0)
            || new.fixed_amount_cents.is_some_and(|c| c < 0)
        {
            return Err(AuthError::Validation("Amounts must not be negative".into()));
        }
        if let (Some(start), Some(end)) = (new.start_date, new.end_date)
            && end < start
        {
            return Err(AuthError::Validation(
                "endDate must not be before startDate".into(),
            ));
        }

        let now = Utc::now();
        let item = PublicItem {
            id: Uuid::now_v7(),
            title: title.to_string(),
            description: new.description.filter(|d| !d.trim().is_empty()),
            kind: new.kind,
            hourly_rate_cents: new.hourly_rate_cents,
            fixed_amount_cents: new.fixed_amount_cents,
            created_by: Some(actor.id),
            start_date: new.start_date,
            end_date: new.end_date,
            active: true,
            created_at: now,
            updated_at: now,
        };
        let item = self.store.create_public_item(item).await?;
        info!(actor = %actor.email, item_id = %item.id, "posted public item");
        Ok(item)
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
