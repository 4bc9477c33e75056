use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::Instant;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub database: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub response_time_ms: u64,
}

/// Readiness probe: 200 when the database answers, 503 otherwise
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service ready", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();
    let db_result = crate::db::ping(&state.db).await;
    let database = if db_result.is_ok() {
        ComponentStatus::Up
    } else {
        ComponentStatus::Down
    };

    let status_code = match database {
        ComponentStatus::Up => StatusCode::OK,
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = HealthResponse {
        status: database,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database,
        error: db_result.err().map(|e| e.to_string()),
        response_time_ms: start.elapsed().as_millis() as u64,
    };

    (status_code, Json(response))
}
