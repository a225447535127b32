//! Job queue on the shared SQLite database

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::model::{Job, JobState, NewJob, RepeatableJob};
use super::queue::{JobMutation, JobQueue};
use crate::db::models::{to_millis, JobRow, RepeatableJobRow};
use crate::db::repositories::{JobRepository, RepeatableJobRepository};
use crate::db::DatabaseConnection;
use crate::{ConductorError, Result};

/// Job queue shared by the control center and every worker.
///
/// Claiming a job is one `UPDATE ... RETURNING` statement, so concurrent
/// workers never receive the same job.
#[derive(Clone)]
pub struct SqliteJobQueue {
    db: DatabaseConnection,
}

impl SqliteJobQueue {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn add(&self, job: NewJob) -> Result<Job> {
        let job = job.into_job();
        let row = JobRow::try_from(&job)?;
        let inserted = JobRepository::insert(self.db.pool(), &row).await?;
        tracing::debug!("Enqueued {} job {} ({})", job.job_type, job.id, job.state);
        Ok(Job::try_from(inserted)?)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        match JobRepository::get_by_id(self.db.pool(), id).await? {
            Some(row) => Ok(Some(Job::try_from(row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, state: JobState, start: usize, end: usize) -> Result<Vec<Job>> {
        if end < start {
            return Ok(Vec::new());
        }
        let limit = to_i64((end - start).saturating_add(1));
        let rows =
            JobRepository::list_by_state(self.db.pool(), &state.to_string(), limit, to_i64(start))
                .await?;
        rows.into_iter()
            .map(|row| Job::try_from(row).map_err(ConductorError::from))
            .collect()
    }

    async fn count(&self, state: JobState) -> Result<u64> {
        let count = JobRepository::count_by_state(self.db.pool(), &state.to_string()).await?;
        Ok(count.max(0) as u64)
    }

    async fn update_job(&self, id: &str, mutation: JobMutation) -> Result<Job> {
        let row = JobRepository::get_by_id(self.db.pool(), id)
            .await?
            .ok_or_else(|| ConductorError::JobNotFound(id.to_string()))?;
        let expected_state = row.state.clone();

        let mut job = Job::try_from(row)?;
        mutation(&mut job)?;

        let updated = JobRepository::save_if_state(self.db.pool(), &JobRow::try_from(&job)?, &expected_state)
            .await?
            .ok_or_else(|| {
                ConductorError::Store(format!("Job {} was modified concurrently", id))
            })?;
        Ok(Job::try_from(updated)?)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(JobRepository::delete(self.db.pool(), id).await?)
    }

    async fn take_next(&self, worker_id: &str, job_types: &[String]) -> Result<Option<Job>> {
        let row = JobRepository::take_next(
            self.db.pool(),
            worker_id,
            job_types,
            Utc::now().timestamp_millis(),
        )
        .await?;
        match row {
            Some(row) => {
                let job = Job::try_from(row)?;
                tracing::debug!("Worker {} took job {}", worker_id, job.id);
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn promote_due_delayed(&self, now: DateTime<Utc>) -> Result<u64> {
        Ok(JobRepository::promote_due_delayed(self.db.pool(), to_millis(now)).await?)
    }

    async fn clean(&self, state: JobState, grace: Duration, limit: usize) -> Result<Vec<String>> {
        let cutoff = Utc::now().timestamp_millis() - grace.as_millis().min(i64::MAX as u128) as i64;
        Ok(JobRepository::clean(self.db.pool(), &state.to_string(), cutoff, to_i64(limit)).await?)
    }

    async fn add_repeatable(&self, job: RepeatableJob) -> Result<RepeatableJob> {
        RepeatableJobRepository::upsert(self.db.pool(), &RepeatableJobRow::try_from(&job)?).await?;
        Ok(job)
    }

    async fn repeatables(&self) -> Result<Vec<RepeatableJob>> {
        RepeatableJobRepository::list(self.db.pool())
            .await?
            .into_iter()
            .map(|row| RepeatableJob::try_from(row).map_err(ConductorError::from))
            .collect()
    }

    async fn remove_repeatable(&self, key: &str) -> Result<bool> {
        Ok(RepeatableJobRepository::delete(self.db.pool(), key).await?)
    }

    async fn set_repeatable_next_run(&self, key: &str, next_run: DateTime<Utc>) -> Result<bool> {
        Ok(RepeatableJobRepository::update_next_run(self.db.pool(), key, to_millis(next_run)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::{job_types, JobPayload, JobPriority};

    async fn queue() -> SqliteJobQueue {
        let db = DatabaseConnection::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        SqliteJobQueue::new(db)
    }

    #[tokio::test]
    async fn test_add_and_get_preserves_payload() {
        let queue = queue().await;
        let payload = JobPayload {
            execution_id: "exec-1".into(),
            user_id: Some("user-1".into()),
            inputs: serde_json::json!({"topic": "sqlite"}),
            ..Default::default()
        };
        let job = queue
            .add(NewJob::new(job_types::WORKFLOW, payload.clone()).with_priority(JobPriority::High))
            .await
            .unwrap();

        let loaded = queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.payload, payload);
        assert_eq!(loaded.priority, JobPriority::High);
        assert_eq!(loaded.state, JobState::Waiting);
    }

    #[tokio::test]
    async fn test_take_next_claims_once() {
        let queue = queue().await;
        queue
            .add(NewJob::new(job_types::WORKFLOW, JobPayload::default()))
            .await
            .unwrap();

        let first = queue.take_next("w1", &[]).await.unwrap();
        let second = queue.take_next("w2", &[]).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(first.unwrap().worker_id.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_lifecycle_through_failure_and_retry() {
        let queue = queue().await;
        let job = queue
            .add(NewJob::new(job_types::EXPORT, JobPayload::default()))
            .await
            .unwrap();
        queue
            .take_next("w1", &[job_types::EXPORT.to_string()])
            .await
            .unwrap();
        let failed = queue.fail(&job.id, "renderer crashed".into()).await.unwrap();
        assert_eq!(failed.failed_reason.as_deref(), Some("renderer crashed"));

        let retried = queue.retry(&job.id).await.unwrap();
        assert_eq!(retried.state, JobState::Waiting);
        assert_eq!(queue.count(JobState::Failed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clean_respects_limit() {
        let queue = queue().await;
        for _ in 0..3 {
            let job = queue
                .add(NewJob::new(job_types::WORKFLOW, JobPayload::default()))
                .await
                .unwrap();
            queue.take_next("w1", &[]).await.unwrap();
            queue.complete(&job.id, None).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        let removed = queue.clean(JobState::Completed, Duration::ZERO, 2).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(queue.count(JobState::Completed).await.unwrap(), 1);
    }
}
