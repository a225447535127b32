//! Job row model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{from_millis, to_millis};
use crate::db::DatabaseError;
use crate::jobs::{Job, JobPriority, JobState};

/// A job as stored in the shared `jobs` table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: String,
    pub job_type: String,
    /// JSON payload string
    pub payload: String,
    /// Priority rank, lower runs first
    pub priority: i64,
    pub state: String,
    pub attempts_made: i64,
    pub delay_until: Option<i64>,
    pub created_at: i64,
    pub processed_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub failed_reason: Option<String>,
    /// JSON return value string
    pub return_value: Option<String>,
    pub worker_id: Option<String>,
    pub repeat_key: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state: JobState = row
            .state
            .parse()
            .map_err(|_| DatabaseError::type_error(format!("Unknown job state: {}", row.state)))?;

        Ok(Job {
            id: row.id,
            job_type: row.job_type,
            payload: serde_json::from_str(&row.payload)?,
            priority: JobPriority::from_rank(row.priority),
            state,
            attempts_made: row.attempts_made.max(0) as u32,
            delay_until: row.delay_until.map(from_millis),
            created_at: from_millis(row.created_at),
            processed_at: row.processed_at.map(from_millis),
            finished_at: row.finished_at.map(from_millis),
            failed_reason: row.failed_reason,
            return_value: row
                .return_value
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            worker_id: row.worker_id,
            repeat_key: row.repeat_key,
        })
    }
}

impl TryFrom<&Job> for JobRow {
    type Error = DatabaseError;

    fn try_from(job: &Job) -> Result<Self, Self::Error> {
        Ok(JobRow {
            id: job.id.clone(),
            job_type: job.job_type.clone(),
            payload: serde_json::to_string(&job.payload)?,
            priority: job.priority.rank(),
            state: job.state.to_string(),
            attempts_made: job.attempts_made as i64,
            delay_until: job.delay_until.map(to_millis),
            created_at: to_millis(job.created_at),
            processed_at: job.processed_at.map(to_millis),
            finished_at: job.finished_at.map(to_millis),
            failed_reason: job.failed_reason.clone(),
            return_value: job
                .return_value
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            worker_id: job.worker_id.clone(),
            repeat_key: job.repeat_key.clone(),
        })
    }
}
