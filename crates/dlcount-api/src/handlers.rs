//! Route handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use dlcount_pool::PoolStats;
use serde::Serialize;

use crate::ApiState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    pool: PoolStats,
}

/// GET /healthz
pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        pool: state.counter.pool().stats().await,
    })
}

/// Everything else. The front proxy only mirrors requests here, so there
/// is nothing to send back.
pub async fn mirrored() -> StatusCode {
    StatusCode::NO_CONTENT
}
