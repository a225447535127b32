//! Job endpoint handlers
//!
//! Single-job actions answer 200 with a [`JobActionResult`] whose `success`
//! flag says whether the action applied; bulk actions report per item.
//!
//! [`JobActionResult`]: crate::jobs::JobActionResult

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::time::Duration;

use crate::api::{
    error::{ApiError, ApiResult},
    models::{
        BulkJobsRequest, BulkPriorityRequest, CleanRequest, CleanResponse, CreateJobRequest, DelayRequest,
        JobListQuery, PriorityRequest, RepeatableRequest, SearchQuery,
    },
    response,
    routes::AppState,
};
use crate::jobs::job_types;

/// POST /api/v1/jobs
pub async fn create_job(
    State(app_state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let job = app_state
        .jobs
        .submit_job(
            req.job_type(),
            req.payload.clone(),
            req.priority.unwrap_or_default(),
            req.delay(),
        )
        .await?;
    Ok(response::created(job))
}

/// GET /api/v1/jobs?state&start&end
pub async fn list_jobs(
    State(app_state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let (state, start, end) = query.resolve()?;
    Ok(response::ok(app_state.jobs.browse_jobs(state, start, end).await?))
}

/// GET /api/v1/jobs/search?term&by
pub async fn search_jobs(
    State(app_state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let (term, field) = query.resolve()?;
    Ok(response::ok(app_state.jobs.search_jobs(&term, field).await?))
}

/// GET /api/v1/jobs/counts
pub async fn job_counts(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.jobs.get_job_counts().await?))
}

/// GET /api/v1/jobs/summary
pub async fn jobs_summary(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.jobs.get_jobs_summary().await?))
}

/// GET /api/v1/jobs/:id
pub async fn get_job(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.jobs.get_job_details(&id).await?))
}

/// POST /api/v1/jobs/:id/retry
pub async fn retry_job(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.jobs.retry_job(&id).await))
}

/// POST /api/v1/jobs/:id/cancel
pub async fn cancel_job(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.jobs.cancel_job(&id).await))
}

/// POST /api/v1/jobs/:id/priority
pub async fn change_priority(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PriorityRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.jobs.change_job_priority(&id, req.priority).await))
}

/// POST /api/v1/jobs/:id/promote
pub async fn promote_job(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.jobs.promote_job(&id).await))
}

/// POST /api/v1/jobs/:id/delay
pub async fn delay_job(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DelayRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    req.validate()?;
    Ok(response::ok(app_state.jobs.delay_job(&id, req.delay_ms).await))
}

/// POST /api/v1/jobs/bulk/retry-failed
pub async fn bulk_retry_failed(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.jobs.bulk_retry_failed().await?))
}

/// POST /api/v1/jobs/bulk/cancel
pub async fn bulk_cancel(
    State(app_state): State<AppState>,
    Json(req): Json<BulkJobsRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.jobs.bulk_cancel(&req.job_ids).await))
}

/// POST /api/v1/jobs/bulk/priority
pub async fn bulk_priority(
    State(app_state): State<AppState>,
    Json(req): Json<BulkPriorityRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(
        app_state.jobs.bulk_change_priority(&req.job_ids, req.priority).await,
    ))
}

/// POST /api/v1/jobs/clean
pub async fn clean_jobs(
    State(app_state): State<AppState>,
    body: Option<Json<CleanRequest>>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let max_age = body
        .and_then(|Json(req)| req.max_age_secs)
        .map(Duration::from_secs);
    let job_ids = app_state.jobs.clean_completed_jobs(max_age).await?;
    Ok(response::ok(CleanResponse {
        removed: job_ids.len(),
        job_ids,
    }))
}

/// GET /api/v1/jobs/repeatable
pub async fn list_repeatable(State(app_state): State<AppState>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.jobs.get_repeatable_jobs().await?))
}

/// POST /api/v1/jobs/repeatable
pub async fn create_repeatable(
    State(app_state): State<AppState>,
    Json(req): Json<RepeatableRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let repeatable = app_state
        .jobs
        .schedule_recurring_job(
            req.job_type.as_deref().unwrap_or(job_types::WORKFLOW),
            req.payload,
            &req.cron,
            req.priority.unwrap_or_default(),
        )
        .await?;
    Ok(response::created(repeatable))
}

/// DELETE /api/v1/jobs/repeatable/:key
pub async fn remove_repeatable(
    State(app_state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if !app_state.jobs.remove_repeatable_job(&key).await? {
        return Err(ApiError::NotFound(format!("Repeatable job not found: {}", key)));
    }
    Ok(response::ok(serde_json::json!({ "key": key, "removed": true })))
}
