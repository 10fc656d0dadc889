//! PostgreSQL stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, StoreError, UniqueKey, WorkplaceStore};
use crate::models::auth::{Role, UserIdentity};
use crate::models::workplace::{Attendance, ItemKind, PayPeriod, PublicItem, SalaryRecord};

const USER_COLUMNS: &str = "id, email, username, password_hash, role, enabled, \
     verification_token_hash, verification_expires_at, labels, created_at";

/// Constraint names from `migrations/0001_create_users.sql`.
const EMAIL_CONSTRAINT: &str = "users_email_key";
const USERNAME_CONSTRAINT: &str = "users_username_key";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    username: String,
    password_hash: String,
    role: String,
    enabled: bool,
    verification_token_hash: Option<String>,
    verification_expires_at: Option<DateTime<Utc>>,
    labels: Vec<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserIdentity {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Corrupt(format!("user {}: {e}", row.id)))?;
        Ok(UserIdentity {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            role,
            enabled: row.enabled,
            verification_token_hash: row.verification_token_hash,
            verification_expires_at: row.verification_expires_at,
            labels: row.labels.into_iter().collect(),
            created_at: row.created_at,
        })
    }
}

/// Unique key guarded by the named constraint, if it is one of ours.
fn unique_key_for(constraint: Option<&str>) -> Option<UniqueKey> {
    match constraint? {
        EMAIL_CONSTRAINT => Some(UniqueKey::Email),
        USERNAME_CONSTRAINT => Some(UniqueKey::Username),
        _ => None,
    }
}

/// Map unique violations onto the key they hit; everything else stays a
/// plain database error.
fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
        && let Some(key) = unique_key_for(db.constraint())
    {
        return StoreError::ConstraintViolation(key);
    }
    StoreError::Database(e)
}

/// Credential store backed by the `users` table.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<UserIdentity>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserIdentity::try_from).transpose()
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserIdentity>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserIdentity::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserIdentity>, StoreError> {
        self.fetch_one_by("email", email).await
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserIdentity>, StoreError> {
        self.fetch_one_by("username", username).await
    }

    async fn find_by_verification_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<UserIdentity>, StoreError> {
        self.fetch_one_by("verification_token_hash", token_hash).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn list_employees(&self, label: Option<&str>) -> Result<Vec<UserIdentity>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE role = 'EMPLOYEE' AND ($1::text IS NULL OR $1 = ANY(labels)) \
             ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(label)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(UserIdentity::try_from).collect()
    }

    async fn save(&self, identity: UserIdentity) -> Result<UserIdentity, StoreError> {
        let labels: Vec<String> = identity.labels.iter().cloned().collect();
        sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, role, enabled, \
                                verification_token_hash, verification_expires_at, labels, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET \
                 email = EXCLUDED.email, \
                 username = EXCLUDED.username, \
                 password_hash = EXCLUDED.password_hash, \
                 role = EXCLUDED.role, \
                 enabled = EXCLUDED.enabled, \
                 verification_token_hash = EXCLUDED.verification_token_hash, \
                 verification_expires_at = EXCLUDED.verification_expires_at, \
                 labels = EXCLUDED.labels",
        )
        .bind(identity.id)
        .bind(&identity.email)
        .bind(&identity.username)
        .bind(&identity.password_hash)
        .bind(identity.role.as_str())
        .bind(identity.enabled)
        .bind(identity.verification_token_hash.as_deref())
        .bind(identity.verification_expires_at)
        .bind(&labels)
        .bind(identity.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(identity)
    }
}

const ITEM_COLUMNS: &str = "id, title, description, kind, hourly_rate_cents, fixed_amount_cents, \
     created_by, start_date, end_date, active, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AttendanceRow {
    id: Uuid,
    user_id: Uuid,
    check_in_time: DateTime<Utc>,
}

impl From<AttendanceRow> for Attendance {
    fn from(row: AttendanceRow) -> Self {
        Attendance {
            id: row.id,
            user_id: row.user_id,
            check_in_time: row.check_in_time,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SalaryRow {
    id: Uuid,
    user_id: Uuid,
    year: i32,
    month: i32,
    amount_cents: i64,
}

impl TryFrom<SalaryRow> for SalaryRecord {
    type Error = StoreError;

    fn try_from(row: SalaryRow) -> Result<Self, Self::Error> {
        let month = u32::try_from(row.month)
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| StoreError::Corrupt(format!("salary {}: month {}", row.id, row.month)))?;
        Ok(SalaryRecord {
            id: row.id,
            user_id: row.user_id,
            year: row.year,
            month,
            amount_cents: row.amount_cents,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PublicItemRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    kind: Option<String>,
    hourly_rate_cents: Option<i64>,
    fixed_amount_cents: Option<i64>,
    created_by: Option<Uuid>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PublicItemRow> for PublicItem {
    type Error = StoreError;

    fn try_from(row: PublicItemRow) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .as_deref()
            .map(str::parse::<ItemKind>)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("public item {}: {e}", row.id)))?;
        Ok(PublicItem {
            id: row.id,
            title: row.title,
            description: row.description,
            kind,
            hourly_rate_cents: row.hourly_rate_cents,
            fixed_amount_cents: row.fixed_amount_cents,
            created_by: row.created_by,
            start_date: row.start_date,
            end_date: row.end_date,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Workplace store backed by the `attendances`, `salary_records` and
/// `public_items` tables.
#[derive(Clone)]
pub struct PgWorkplaceStore {
    pool: PgPool,
}

impl PgWorkplaceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkplaceStore for PgWorkplaceStore {
    async fn record_attendance(&self, attendance: Attendance) -> Result<Attendance, StoreError> {
        sqlx::query("INSERT INTO attendances (id, user_id, check_in_time) VALUES ($1, $2, $3)")
            .bind(attendance.id)
            .bind(attendance.user_id)
            .bind(attendance.check_in_time)
            .execute(&self.pool)
            .await?;
        Ok(attendance)
    }

    async fn attendances_between(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Attendance>, StoreError> {
        let rows = sqlx::query_as::<_, AttendanceRow>(
            "SELECT id, user_id, check_in_time FROM attendances \
             WHERE user_id = $1 AND check_in_time >= $2 AND check_in_time < $3 \
             ORDER BY check_in_time, id",
        )
        .bind(user_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Attendance::from).collect())
    }

    async fn save_salary(&self, record: SalaryRecord) -> Result<SalaryRecord, StoreError> {
        let month = i32::try_from(record.month)
            .map_err(|_| StoreError::Corrupt(format!("salary {}: month {}", record.id, record.month)))?;
        let row = sqlx::query_as::<_, SalaryRow>(
            "INSERT INTO salary_records (id, user_id, year, month, amount_cents) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, year, month) DO UPDATE SET \
                 amount_cents = EXCLUDED.amount_cents \
             RETURNING id, user_id, year, month, amount_cents",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.year)
        .bind(month)
        .bind(record.amount_cents)
        .fetch_one(&self.pool)
        .await?;
        SalaryRecord::try_from(row)
    }

    async fn salaries(
        &self,
        user_id: Uuid,
        period: Option<PayPeriod>,
    ) -> Result<Vec<SalaryRecord>, StoreError> {
        let rows = sqlx::query_as::<_, SalaryRow>(
            "SELECT id, user_id, year, month, amount_cents FROM salary_records \
             WHERE user_id = $1 \
               AND ($2::int IS NULL OR (year = $2 AND month = $3)) \
             ORDER BY year DESC, month DESC",
        )
        .bind(user_id)
        .bind(period.map(|p| p.year))
        .bind(period.map(|p| p.month as i32))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SalaryRecord::try_from).collect()
    }

    async fn create_public_item(&self, item: PublicItem) -> Result<PublicItem, StoreError> {
        sqlx::query(
            "INSERT INTO public_items (id, title, description, kind, hourly_rate_cents, \
                                       fixed_amount_cents, created_by, start_date, end_date, \
                                       active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(item.id)
        .bind(&item.title)
        .bind(item.description.as_deref())
        .bind(item.kind.map(|k| k.as_str()))
        .bind(item.hourly_rate_cents)
        .bind(item.fixed_amount_cents)
        .bind(item.created_by)
        .bind(item.start_date)
        .bind(item.end_date)
        .bind(item.active)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(item)
    }

    async fn public_items(&self) -> Result<Vec<PublicItem>, StoreError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM public_items ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query_as::<_, PublicItemRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PublicItem::try_from).collect()
    }
}
