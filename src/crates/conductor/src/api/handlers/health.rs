//! Health check endpoint handler

use axum::{extract::State, http::StatusCode, Json};

use crate::api::{models::HealthResponse, routes::AppState};

/// Handler for GET /health
///
/// Answers 503 when the database does not respond.
pub async fn health(State(app_state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let Some(db) = &app_state.db else {
        return (
            StatusCode::OK,
            Json(HealthResponse::new("ok", "none", app_state.name.as_str())),
        );
    };
    match db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse::new("ok", "connected", app_state.name.as_str())),
        ),
        Err(e) => {
            tracing::warn!("Database health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::new("error", "error", app_state.name.as_str())),
            )
        }
    }
}
