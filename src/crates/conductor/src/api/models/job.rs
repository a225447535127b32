//! Job API models

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::validation::{validate_not_empty, validate_range};
use crate::jobs::{job_types, JobPayload, JobPriority, JobState, SearchField};

/// Largest page `GET /jobs` returns
pub const MAX_PAGE: usize = 500;

/// `POST /jobs`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    /// Defaults to `workflow`
    #[serde(default)]
    pub job_type: Option<String>,

    #[serde(default)]
    pub payload: JobPayload,

    #[serde(default)]
    pub priority: Option<JobPriority>,

    /// Start in the delayed set for this many milliseconds
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl CreateJobRequest {
    pub fn job_type(&self) -> &str {
        self.job_type.as_deref().unwrap_or(job_types::WORKFLOW)
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

/// `GET /jobs?state&start&end`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    pub state: Option<String>,
    pub start: Option<usize>,
    pub end: Option<usize>,
}

impl JobListQuery {
    /// State and inclusive range, defaulting to the first 20 waiting jobs
    pub fn resolve(&self) -> ApiResult<(JobState, usize, usize)> {
        let state = match self.state.as_deref() {
            Some(state) => state.parse::<JobState>()?,
            None => JobState::Waiting,
        };
        let start = self.start.unwrap_or(0);
        let end = self.end.unwrap_or(start + 19);
        validate_range(start, end, MAX_PAGE)?;
        Ok((state, start, end))
    }
}

/// `GET /jobs/search?term&by`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub term: Option<String>,
    pub by: Option<String>,
}

impl SearchQuery {
    pub fn resolve(&self) -> ApiResult<(String, SearchField)> {
        let term = self.term.clone().unwrap_or_default();
        validate_not_empty(&term, "term")?;
        let field = match self.by.as_deref() {
            Some(by) => by.parse::<SearchField>()?,
            None => SearchField::default(),
        };
        Ok((term, field))
    }
}

/// `POST /jobs/:id/priority`
#[derive(Debug, Clone, Deserialize)]
pub struct PriorityRequest {
    pub priority: JobPriority,
}

/// `POST /jobs/:id/delay`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayRequest {
    pub delay_ms: u64,
}

impl DelayRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if self.delay_ms == 0 {
            return Err(ApiError::ValidationError("delayMs must be positive".into()));
        }
        Ok(())
    }
}

/// `POST /jobs/bulk/cancel`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkJobsRequest {
    pub job_ids: Vec<String>,
}

/// `POST /jobs/bulk/priority`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPriorityRequest {
    pub job_ids: Vec<String>,
    pub priority: JobPriority,
}

/// `POST /jobs/clean`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanRequest {
    /// Age past which completed jobs go; the configured grace otherwise
    pub max_age_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanResponse {
    pub removed: usize,
    pub job_ids: Vec<String>,
}

/// `POST /jobs/repeatable`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatableRequest {
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub payload: JobPayload,
    pub cron: String,
    #[serde(default)]
    pub priority: Option<JobPriority>,
}
