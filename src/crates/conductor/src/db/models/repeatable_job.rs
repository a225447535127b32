//! Repeatable job row model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{from_millis, to_millis};
use crate::db::DatabaseError;
use crate::jobs::{JobPriority, RepeatableJob};

/// A cron-scheduled job template as stored in `repeatable_jobs`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RepeatableJobRow {
    pub key: String,
    pub job_type: String,
    pub payload: String,
    pub priority: i64,
    pub cron: String,
    pub next_run: i64,
    pub created_at: i64,
}

impl TryFrom<RepeatableJobRow> for RepeatableJob {
    type Error = DatabaseError;

    fn try_from(row: RepeatableJobRow) -> Result<Self, Self::Error> {
        Ok(RepeatableJob {
            key: row.key,
            job_type: row.job_type,
            payload: serde_json::from_str(&row.payload)?,
            priority: JobPriority::from_rank(row.priority),
            cron: row.cron,
            next_run: from_millis(row.next_run),
            created_at: from_millis(row.created_at),
        })
    }
}

impl TryFrom<&RepeatableJob> for RepeatableJobRow {
    type Error = DatabaseError;

    fn try_from(job: &RepeatableJob) -> Result<Self, Self::Error> {
        Ok(RepeatableJobRow {
            key: job.key.clone(),
            job_type: job.job_type.clone(),
            payload: serde_json::to_string(&job.payload)?,
            priority: job.priority.rank(),
            cron: job.cron.clone(),
            next_run: to_millis(job.next_run),
            created_at: to_millis(job.created_at),
        })
    }
}
