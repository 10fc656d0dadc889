//! Handlers available to every authenticated account.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use tracing::info;

use crate::AppState;
use crate::error::AppResult;
use crate::handlers::optional_json;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    AttendanceQuery, AttendanceResponse, MessageResponse, PublicItemResponse, SalaryQuery,
    SalaryRecordResponse, SendEmailRequest, UserResponse,
};

const DEFAULT_SUBJECT: &str = "Hello from Salary System";
const DEFAULT_BODY: &str =
    "You triggered this email from the web UI. If you didn't expect this, ignore it.";

/// `GET /api/employee/me`: the caller's own account.
pub async fn me_handler(
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Json<UserResponse> {
    Json(user.into())
}

/// `POST /api/employee/email-me`: queue a mail to the caller's address.
///
/// Blank or missing subject and body fall back to a stock message.
pub async fn email_me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    body: Bytes,
) -> AppResult<Json<MessageResponse>> {
    let req: SendEmailRequest = optional_json(&body)?;
    let subject = non_blank(req.subject).unwrap_or_else(|| DEFAULT_SUBJECT.into());
    let text = non_blank(req.body).unwrap_or_else(|| DEFAULT_BODY.into());

    state.auth.mail_principal(&user, &subject, &text);
    info!(user_id = %user.id, "queued self-addressed mail");
    Ok(Json(MessageResponse::new("Email queued")))
}

/// `POST /api/employee/clock-in`: record a clock-in at the current time.
pub async fn clock_in_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> AppResult<(StatusCode, Json<AttendanceResponse>)> {
    let attendance = state.workplace.clock_in(&user).await?;
    Ok((StatusCode::CREATED, Json(attendance.into())))
}

/// `GET /api/employee/attendances?start=&end=`
pub async fn attendances_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Query(query): Query<AttendanceQuery>,
) -> AppResult<Json<Vec<AttendanceResponse>>> {
    let attendances = state
        .workplace
        .attendances(&user, query.start, query.end)
        .await?;
    Ok(Json(attendances.into_iter().map(AttendanceResponse::from).collect()))
}

/// `GET /api/employee/salaries?year=&month=`
pub async fn salaries_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Query(query): Query<SalaryQuery>,
) -> AppResult<Json<Vec<SalaryRecordResponse>>> {
    let salaries = state
        .workplace
        .salaries(&user, query.year, query.month)
        .await?;
    Ok(Json(salaries.into_iter().map(SalaryRecordResponse::from).collect()))
}

/// `GET /api/employee/public-items`
pub async fn public_items_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<PublicItemResponse>>> {
    let items = state.workplace.public_items().await?;
    Ok(Json(items.into_iter().map(PublicItemResponse::from).collect()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
