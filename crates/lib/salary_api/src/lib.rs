//! # salary_api
//!
//! HTTP API library for the salary service.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use salary_core::auth::{AuthService, AuthorizationGate};
use salary_core::workplace::WorkplaceService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{auth, boss, employee, health};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Account operations.
    pub auth: Arc<AuthService>,
    /// Per-request authorization, sharing the service's store and tokens.
    pub gate: AuthorizationGate,
    /// Attendance, salary and public item operations.
    pub workplace: Arc<WorkplaceService>,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>, workplace: Arc<WorkplaceService>) -> Self {
        let gate = auth.gate();
        Self {
            auth,
            gate,
            workplace,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/api/health", get(health::health_handler))
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/verify", get(auth::verify_handler))
        .route("/api/auth/verify-email", post(auth::verify_handler))
        .route(
            "/api/auth/resend-verification",
            post(auth::resend_verification_handler),
        )
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route("/api/auth/temporary", get(auth::temporary_handler));

    // Any authenticated account
    let employee = Router::new()
        .route("/api/employee/me", get(employee::me_handler))
        .route("/api/employee/email-me", post(employee::email_me_handler))
        .route("/api/employee/clock-in", post(employee::clock_in_handler))
        .route(
            "/api/employee/attendances",
            get(employee::attendances_handler),
        )
        .route("/api/employee/salaries", get(employee::salaries_handler))
        .route(
            "/api/employee/public-items",
            get(employee::public_items_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // BOSS only
    let boss = Router::new()
        .route(
            "/api/boss/employees",
            post(boss::create_employee_handler).get(boss::list_employees_handler),
        )
        .route(
            "/api/boss/employees/{id}/labels",
            put(boss::set_labels_handler),
        )
        .route(
            "/api/boss/public-items",
            post(boss::create_public_item_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_boss,
        ));

    Router::new()
        .merge(public)
        .merge(employee)
        .merge(boss)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
