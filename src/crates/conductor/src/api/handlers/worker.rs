//! Worker surface handlers
//!
//! Served by every `workflow-worker` at the root of its HTTP listener.
//! `POST /execute` answers 202 and runs in the background when the body
//! sets `options.wait` to false; otherwise it holds the request until the
//! execution ends. A request carrying a job id whose execution already has
//! a record resumes it.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::api::{
    error::{ApiError, ApiResult},
    middleware::validation::{validate_execution_id, validate_not_empty},
    models::{AcceptedExecution, ExecuteRequest, ResumeBody},
    response,
};
use crate::execution::ExecutionCommand;
use crate::worker::WorkerRuntime;

/// POST /execute
pub async fn execute(
    State(runtime): State<Arc<WorkerRuntime>>,
    Json(body): Json<ExecuteRequest>,
) -> ApiResult<Response> {
    let wait = body.wait();
    let job_id = body.job_id.clone();
    let request = body.into_execution_request()?;
    let execution_id = request.execution_id.clone();
    let command = match job_id {
        Some(_) => runtime.job_command(request).await?,
        None => ExecutionCommand::Start(request),
    };

    if !wait {
        runtime.spawn(command, job_id)?;
        tracing::info!("Accepted execution {} in the background", execution_id);
        return Ok(response::accepted(AcceptedExecution::queued(execution_id)).into_response());
    }

    let result = runtime.run(command, job_id).await?;
    Ok(response::ok(result).into_response())
}

/// GET /status
pub async fn worker_status(State(runtime): State<Arc<WorkerRuntime>>) -> ApiResult<impl IntoResponse> {
    Ok(response::ok(runtime.status()))
}

/// GET /status/:execution_id
///
/// Live executions report their in-memory state, finished ones the stored
/// record.
pub async fn execution_status(
    State(runtime): State<Arc<WorkerRuntime>>,
    Path(execution_id): Path<String>,
) -> ApiResult<Response> {
    if let Some(view) = runtime.manager().status(&execution_id) {
        return Ok(response::ok(view).into_response());
    }
    let record = runtime
        .manager()
        .engine()
        .store()
        .get_record(&execution_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Execution not found: {}", execution_id)))?;
    Ok(response::ok(record).into_response())
}

/// POST /stop/:execution_id
pub async fn stop(
    State(runtime): State<Arc<WorkerRuntime>>,
    Path(execution_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    runtime.manager().stop(&execution_id)?;
    Ok(response::ok(json!({ "executionId": execution_id, "status": "stopping" })))
}

/// POST /pause/:execution_id
pub async fn pause(
    State(runtime): State<Arc<WorkerRuntime>>,
    Path(execution_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let changed = runtime.manager().pause(&execution_id)?;
    Ok(response::ok(json!({ "executionId": execution_id, "paused": true, "changed": changed })))
}

/// POST /unpause/:execution_id
pub async fn unpause(
    State(runtime): State<Arc<WorkerRuntime>>,
    Path(execution_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let changed = runtime.manager().resume_paused(&execution_id)?;
    Ok(response::ok(json!({ "executionId": execution_id, "paused": false, "changed": changed })))
}

/// POST /resume
pub async fn resume(
    State(runtime): State<Arc<WorkerRuntime>>,
    Json(body): Json<ResumeBody>,
) -> ApiResult<impl IntoResponse> {
    let request = body.into_resume_request()?;
    let result = runtime.run(ExecutionCommand::Resume(request), None).await?;
    Ok(response::ok(result))
}

/// POST /regenerate
pub async fn regenerate(
    State(runtime): State<Arc<WorkerRuntime>>,
    Json(body): Json<ResumeBody>,
) -> ApiResult<impl IntoResponse> {
    validate_execution_id(&body.execution_id)?;
    validate_not_empty(body.guidance.as_deref().unwrap_or_default(), "guidance")?;
    let request = body.into_resume_request()?;
    let result = runtime.run(ExecutionCommand::Regenerate(request), None).await?;
    Ok(response::ok(result))
}

/// GET /health
pub async fn health(State(runtime): State<Arc<WorkerRuntime>>) -> impl IntoResponse {
    let status = runtime.status();
    let state = if status.load.available > 0 { "ok" } else { "busy" };
    response::ok(json!({
        "status": state,
        "version": crate::version(),
        "worker": status,
    }))
}
