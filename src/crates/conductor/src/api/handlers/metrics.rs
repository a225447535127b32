//! Fleet metrics endpoint handlers

use axum::extract::State;

use crate::api::{error::ApiResult, response, routes::AppState};

/// GET /api/v1/metrics
///
/// The latest sample, collected on demand before the first poll.
pub async fn current_metrics(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    let sample = match app_state.metrics.latest() {
        Some(sample) => sample,
        None => app_state.metrics.collect().await?,
    };
    Ok(response::ok(sample))
}

/// GET /api/v1/metrics/history
pub async fn metrics_history(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.metrics.history()))
}

/// GET /api/v1/metrics/recommendations
pub async fn recommendations(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.metrics.recommendations()))
}
