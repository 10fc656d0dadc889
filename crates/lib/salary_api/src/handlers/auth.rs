//! Authentication request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use salary_core::models::auth::VerificationOutcome;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::handlers::optional_json;
use crate::models::{
    LoginRequest, LoginResponse, LogoutRequest, MessageResponse, RegisterRequest,
    RegisterResponse, ResendVerificationRequest, TokenQuery, UserResponse,
};

/// `POST /api/auth/register`: create a self-service account.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let principal = state
        .auth
        .register(&body.username, &body.email, &body.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Check your email to verify your account.".into(),
            user: principal.into(),
        }),
    ))
}

/// `GET /api/auth/verify?token=` and `POST /api/auth/verify-email?token=`.
pub async fn verify_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> AppResult<Json<MessageResponse>> {
    match state.auth.verify(&query.token).await? {
        VerificationOutcome::Verified => Ok(Json(MessageResponse::new("Email verified"))),
        VerificationOutcome::InvalidToken => Err(AppError::InvalidToken(
            "Verification token is invalid or expired".into(),
        )),
    }
}

/// `POST /api/auth/resend-verification`: always answers the same way.
pub async fn resend_verification_handler(
    State(state): State<AppState>,
    Json(body): Json<ResendVerificationRequest>,
) -> AppResult<Json<MessageResponse>> {
    state.auth.resend_verification(&body.email).await?;
    Ok(Json(MessageResponse::new(
        "If the account exists and is not yet verified, a new verification email has been sent",
    )))
}

/// `POST /api/auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let bundle = state.auth.login(&body.email, &body.password).await?;
    Ok(Json(bundle.into()))
}

/// `POST /api/auth/logout`: revoke the temporary token, if one is given.
/// The body is optional.
pub async fn logout_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<MessageResponse>> {
    let body: LogoutRequest = optional_json(&body)?;
    if let Some(token) = body.temporary_token {
        state.auth.logout(&token);
    }
    Ok(Json(MessageResponse::new("Logged out")))
}

/// `GET /api/auth/temporary?token=`: resolve a temporary token.
pub async fn temporary_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> AppResult<Json<UserResponse>> {
    let principal = state.gate.authorize_temporary(&query.token, None).await?;
    Ok(Json(principal.into()))
}
