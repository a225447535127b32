//! Worker factory endpoint handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;

use crate::api::{
    error::{ApiError, ApiResult},
    models::{BatchRequest, CloneRequest, ScaleRequest},
    response,
    routes::AppState,
};
use crate::deployment::CreateWorkerRequest;

/// GET /api/v1/factory/templates
pub async fn list_templates(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.factory.list_templates()))
}

/// GET /api/v1/factory/workers
pub async fn list_workers(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.factory.list_workers().await?))
}

/// POST /api/v1/factory/workers
pub async fn create_worker(
    State(app_state): State<AppState>,
    Json(req): Json<CreateWorkerRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let worker = app_state.factory.create_worker(req).await?;
    Ok(response::created(worker))
}

/// POST /api/v1/factory/workers/batch
pub async fn create_batch(
    State(app_state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    req.validate()?;
    Ok(response::ok(app_state.factory.create_batch(req.workers).await))
}

/// POST /api/v1/factory/workers/:id/clone
pub async fn clone_worker(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<CloneRequest>>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let overrides = body.map(|Json(req)| req.overrides).unwrap_or_default();
    let worker = app_state.factory.clone_worker(&id, overrides).await?;
    Ok(response::created(worker))
}

/// DELETE /api/v1/factory/workers/:id
pub async fn delete_worker(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !app_state.factory.delete_worker(&id).await? {
        return Err(ApiError::NotFound(format!("Worker not found: {}", id)));
    }
    Ok(response::ok(json!({ "name": id, "deleted": true })))
}

/// POST /api/v1/factory/scale
pub async fn scale(
    State(app_state): State<AppState>,
    Json(req): Json<ScaleRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.factory.scale(req.target).await?))
}

/// GET /api/v1/factory/suggestions
pub async fn suggestions(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.factory.suggestions().await?))
}
