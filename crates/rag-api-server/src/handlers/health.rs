use axum::extract::State;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Probes the database pool so orchestrators stop routing traffic to an
/// instance that can't serve `/auth` or `/content` requests.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match state.repository.get_user_by_id(Uuid::nil()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
