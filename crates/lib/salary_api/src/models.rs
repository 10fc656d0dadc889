//! Request and response bodies. JSON field names are camelCase.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use salary_core::models::auth::{Principal, Role, SessionBundle};
use salary_core::models::workplace::{Attendance, ItemKind, PublicItem, SalaryRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub temporary_token: Option<String>,
}

/// `?token=` query used by the verify and temporary-token endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelQuery {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub labels: BTreeSet<String>,
}

impl From<Principal> for UserResponse {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            username: p.username,
            email: p.email,
            role: p.role,
            labels: p.labels,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_token: String,
    pub temporary_token: String,
    pub token_type: String,
    /// Session token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

impl From<SessionBundle> for LoginResponse {
    fn from(bundle: SessionBundle) -> Self {
        Self {
            session_token: bundle.session_token,
            temporary_token: bundle.temporary_token,
            token_type: "Bearer".into(),
            expires_in: bundle.expires_in,
            user: bundle.principal.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEmployeeRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLabelsRequest {
    pub labels: Vec<String>,
}

/// `?start=YYYY-MM-DD&end=YYYY-MM-DD`, both days inclusive.
#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SalaryQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub check_in_time: DateTime<Utc>,
}

impl From<Attendance> for AttendanceResponse {
    fn from(a: Attendance) -> Self {
        Self {
            id: a.id,
            user_id: a.user_id,
            check_in_time: a.check_in_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryRecordResponse {
    pub id: Uuid,
    pub year: i32,
    pub month: u32,
    pub amount_cents: i64,
}

impl From<SalaryRecord> for SalaryRecordResponse {
    fn from(r: SalaryRecord) -> Self {
        Self {
            id: r.id,
            year: r.year,
            month: r.month,
            amount_cents: r.amount_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePublicItemRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<ItemKind>,
    #[serde(default)]
    pub hourly_rate_cents: Option<i64>,
    #[serde(default)]
    pub fixed_amount_cents: Option<i64>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicItemResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<ItemKind>,
    pub hourly_rate_cents: Option<i64>,
    pub fixed_amount_cents: Option<i64>,
    pub created_by: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PublicItem> for PublicItemResponse {
    fn from(item: PublicItem) -> Self {
        Self {
            id: item.id,
            title: item.title,
            description: item.description,
            kind: item.kind,
            hourly_rate_cents: item.hourly_rate_cents,
            fixed_amount_cents: item.fixed_amount_cents,
            created_by: item.created_by,
            start_date: item.start_date,
            end_date: item.end_date,
            active: item.active,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub time: DateTime<Utc>,
}
