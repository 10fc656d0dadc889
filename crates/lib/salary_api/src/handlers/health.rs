//! Liveness endpoint.

use axum::Json;
use chrono::Utc;

use crate::models::HealthResponse;

/// `GET /api/health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: salary_core::version().into(),
        time: Utc::now(),
    })
}
