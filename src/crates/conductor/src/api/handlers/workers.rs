//! Registry endpoint handlers

use axum::extract::{Path, State};
use serde_json::json;

use crate::api::{
    error::{ApiError, ApiResult},
    response,
    routes::AppState,
};

/// GET /api/v1/workers
pub async fn list_workers(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    let workers = app_state.registry.get_all_workers().await?;
    Ok(response::ok(workers))
}

/// GET /api/v1/workers/healthy
pub async fn healthy_workers(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.registry.get_healthy_workers().await))
}

/// GET /api/v1/workers/:id
pub async fn get_worker(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.registry.get_worker(&id).await?))
}

/// DELETE /api/v1/workers/:id
pub async fn remove_worker(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !app_state.registry.remove_worker(&id).await? {
        return Err(ApiError::NotFound(format!("Worker not found: {}", id)));
    }
    tracing::info!("Removed worker {} from the registry", id);
    Ok(response::ok(json!({ "workerId": id, "removed": true })))
}

/// POST /api/v1/workers/sweep
pub async fn sweep_workers(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    let removed = app_state.registry.sweep_dead_workers().await?;
    Ok(response::ok(json!({ "removed": removed })))
}
