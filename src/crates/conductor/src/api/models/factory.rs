//! Factory API models

use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::deployment::{CreateWorkerRequest, WorkerOverrides};

/// Most workers one batch may create
pub const MAX_BATCH: usize = 50;

/// `POST /factory/scale`
#[derive(Debug, Clone, Deserialize)]
pub struct ScaleRequest {
    pub target: usize,
}

/// `POST /factory/workers/:id/clone`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CloneRequest {
    #[serde(flatten)]
    pub overrides: WorkerOverrides,
}

/// `POST /factory/workers/batch`
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub workers: Vec<CreateWorkerRequest>,
}

impl BatchRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if self.workers.is_empty() {
            return Err(ApiError::ValidationError("workers must not be empty".into()));
        }
        if self.workers.len() > MAX_BATCH {
            return Err(ApiError::ValidationError(format!(
                "at most {} workers per batch",
                MAX_BATCH
            )));
        }
        Ok(())
    }
}
