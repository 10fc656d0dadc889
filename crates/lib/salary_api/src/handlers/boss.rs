//! BOSS-only account management and public item posting.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use salary_core::auth::service::NewEmployee;
use salary_core::workplace::NewPublicItem;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    CreateEmployeeRequest, CreatePublicItemRequest, LabelQuery, PublicItemResponse,
    SetLabelsRequest, UserResponse,
};

/// `POST /api/boss/employees`: create an enabled EMPLOYEE account.
pub async fn create_employee_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
    Json(body): Json<CreateEmployeeRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let employee = NewEmployee {
        username: body.username,
        email: body.email,
        password: body.password,
        labels: body.labels,
    };
    let created = state.auth.create_employee(&actor, employee).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// `GET /api/boss/employees?label=`
pub async fn list_employees_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
    Query(query): Query<LabelQuery>,
) -> AppResult<Json<Vec<UserResponse>>> {
    let employees = state
        .auth
        .list_employees(&actor, query.label.as_deref())
        .await?;
    Ok(Json(employees.into_iter().map(UserResponse::from).collect()))
}

/// `PUT /api/boss/employees/{id}/labels`: replace an account's labels.
pub async fn set_labels_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetLabelsRequest>,
) -> AppResult<Json<UserResponse>> {
    let updated = state.auth.set_labels(&actor, id, &body.labels).await?;
    Ok(Json(updated.into()))
}

/// `POST /api/boss/public-items`: post an item to every employee.
pub async fn create_public_item_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
    Json(body): Json<CreatePublicItemRequest>,
) -> AppResult<(StatusCode, Json<PublicItemResponse>)> {
    let item = NewPublicItem {
        title: body.title,
        description: body.description,
        kind: body.kind,
        hourly_rate_cents: body.hourly_rate_cents,
        fixed_amount_cents: body.fixed_amount_cents,
        start_date: body.start_date,
        end_date: body.end_date,
    };
    let created = state.workplace.create_public_item(&actor, item).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}
