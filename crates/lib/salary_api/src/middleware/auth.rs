//! Authentication middleware: resolves the caller and checks the route's role.
//!
//! The session token comes from `Authorization: Bearer <token>`. Requests
//! without that header may instead carry a temporary token in the
//! `temp_token` query parameter.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use salary_core::models::auth::{Principal, Role};

use crate::AppState;
use crate::error::AppError;

/// Query parameter carrying a temporary token.
pub const TEMP_TOKEN_PARAM: &str = "temp_token";

/// Principal stored in request extensions by [`require_auth`] and
/// [`require_boss`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Principal);

/// Any authenticated, enabled account.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&state, request, next, None).await
}

/// BOSS accounts only.
pub async fn require_boss(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&state, request, next, Some(Role::Boss)).await
}

async fn authorize(
    state: &AppState,
    mut request: Request,
    next: Next,
    required: Option<Role>,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let principal = match (header, temp_token(&request)) {
        (None, Some(token)) => state.gate.authorize_temporary(&token, required).await?,
        (header, _) => state.gate.authorize_header(header, required).await?,
    };

    request.extensions_mut().insert(AuthenticatedUser(principal));
    Ok(next.run(request).await)
}

fn temp_token(request: &Request) -> Option<String> {
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TEMP_TOKEN_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
