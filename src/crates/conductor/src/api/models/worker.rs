//! Worker surface DTOs
//!
//! These bodies travel both ways: the control center's dispatcher builds
//! them from queued jobs and the worker's handlers parse them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::validation::validate_execution_id;
use crate::execution::{ExecutionRequest, ResumeRequest, WorkflowGraph};
use crate::jobs::Job;

/// Per-request options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteOptions {
    /// `false` asks a queue-enabled worker to answer 202 and run in the background
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,
}

/// `POST /execute`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecuteRequest {
    pub execution_id: String,
    /// Queue job the execution belongs to, completed or failed when it ends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub workflow: Option<serde_json::Value>,
    pub inputs: serde_json::Value,
    pub engines: BTreeMap<String, String>,
    pub options: ExecuteOptions,
}

impl ExecuteRequest {
    /// Body for dispatching a claimed queue job without waiting for it
    pub fn from_job(job: &Job) -> Self {
        Self {
            execution_id: job.payload.execution_id.clone(),
            job_id: Some(job.id.clone()),
            user_id: job.payload.user_id.clone(),
            workflow: job.payload.workflow.clone(),
            inputs: job.payload.inputs.clone(),
            engines: job.payload.engines.clone(),
            options: ExecuteOptions { wait: Some(false) },
        }
    }

    /// Whether the caller waits for the result
    pub fn wait(&self) -> bool {
        self.options.wait.unwrap_or(true)
    }

    /// Check the body and parse the graph
    pub fn into_execution_request(self) -> ApiResult<ExecutionRequest> {
        validate_execution_id(&self.execution_id)?;
        let workflow = parse_workflow(self.workflow)?;
        Ok(ExecutionRequest {
            execution_id: self.execution_id,
            job_id: self.job_id,
            user_id: self.user_id,
            workflow,
            inputs: with_engines(self.inputs, self.engines),
        })
    }
}

/// `POST /resume` and `POST /regenerate`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeBody {
    pub execution_id: String,
    pub workflow: Option<serde_json::Value>,
    pub inputs: serde_json::Value,
    /// Regeneration guidance, required by `/regenerate`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
}

impl ResumeBody {
    pub fn into_resume_request(self) -> ApiResult<ResumeRequest> {
        validate_execution_id(&self.execution_id)?;
        let workflow = parse_workflow(self.workflow)?;
        Ok(ResumeRequest {
            execution_id: self.execution_id,
            workflow,
            inputs: self.inputs,
            regeneration: self.guidance,
        })
    }
}

/// 202 body for background executions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedExecution {
    pub execution_id: String,
    pub status: String,
}

impl AcceptedExecution {
    pub fn queued(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: "queued".to_string(),
        }
    }
}

fn parse_workflow(workflow: Option<serde_json::Value>) -> ApiResult<WorkflowGraph> {
    let workflow = workflow
        .filter(|w| !w.is_null())
        .ok_or_else(|| ApiError::ValidationError("workflow is required".into()))?;
    serde_json::from_value(workflow)
        .map_err(|e| ApiError::ValidationError(format!("Invalid workflow: {}", e)))
}

/// Engine choices ride along in the inputs under `engines`
fn with_engines(inputs: serde_json::Value, engines: BTreeMap<String, String>) -> serde_json::Value {
    if engines.is_empty() {
        return inputs;
    }
    let mut inputs = match inputs {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("input".to_string(), other);
            map
        }
    };
    inputs
        .entry("engines")
        .or_insert_with(|| serde_json::json!(engines));
    serde_json::Value::Object(inputs)
}
