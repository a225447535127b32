//! Routing endpoint handlers

use axum::{extract::State, Json};
use serde_json::json;

use crate::api::{
    error::ApiResult,
    models::{AffinityRequest, StrategyRequest},
    response,
    routes::AppState,
};

/// GET /api/v1/routing/strategy
pub async fn get_strategy(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(json!({ "strategy": app_state.routing.strategy() })))
}

/// PUT /api/v1/routing/strategy
pub async fn set_strategy(
    State(app_state): State<AppState>,
    Json(req): Json<StrategyRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    app_state.routing.set_strategy(req.strategy);
    Ok(response::ok(json!({ "strategy": req.strategy })))
}

/// GET /api/v1/routing/strategies
pub async fn list_strategies(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.routing.available_strategies()))
}

/// GET /api/v1/routing/metrics
pub async fn routing_metrics(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.routing.metrics()))
}

/// POST /api/v1/routing/metrics/reset
pub async fn reset_routing_metrics(
    State(app_state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    app_state.routing.reset_metrics();
    Ok(response::ok(app_state.routing.metrics()))
}

/// GET /api/v1/routing/affinity
pub async fn get_affinity(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.routing.affinity_rules()))
}

/// PUT /api/v1/routing/affinity
pub async fn set_affinity(
    State(app_state): State<AppState>,
    Json(req): Json<AffinityRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    req.validate()?;
    if req.tags.is_empty() {
        app_state.routing.remove_affinity_rule(&req.job_type);
    } else {
        app_state.routing.set_affinity_rule(req.job_type, req.tags);
    }
    Ok(response::ok(app_state.routing.affinity_rules()))
}
