//! Job lifecycle control over a [`JobQueue`]
//!
//! Single-job actions report failure in a [`JobActionResult`] instead of an
//! error, and bulk actions never abort: every id gets an outcome.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use super::model::{job_types, Job, JobCounts, JobPayload, JobPriority, JobState, NewJob, RepeatableJob};
use super::queue::JobQueue;
use super::recurring::next_cron_run;
use crate::dispatch::WorkerClient;
use crate::execution::ExecutionStore;
use crate::registry::WorkerRegistry;
use crate::{ConductorError, Result};

/// Job manager settings (`[jobs]` in the control center config)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Completed jobs younger than this survive a clean
    pub clean_grace_secs: u64,
    /// Maximum jobs removed per clean
    pub clean_limit: usize,
    /// Maximum results returned by a search
    pub search_limit: usize,
    /// Recent jobs listed per state in the summary
    pub summary_recent: usize,
    /// Recurring scheduler tick period
    pub scheduler_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            clean_grace_secs: 3600,
            clean_limit: 1000,
            search_limit: 100,
            summary_recent: 5,
            scheduler_interval_secs: 15,
        }
    }
}

impl JobsConfig {
    pub fn clean_grace(&self) -> Duration {
        Duration::from_secs(self.clean_grace_secs)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs.max(1))
    }
}

/// Execution metadata attached to a listed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub user_id: Option<String>,
    pub current_node: Option<String>,
    pub status: String,
    pub progress: i64,
}

/// A job plus whatever is known about its execution
#[derive(Debug, Clone, Serialize)]
pub struct JobListing {
    #[serde(flatten)]
    pub job: Job,
    pub execution: Option<ExecutionSummary>,
}

/// Outcome of a single-job action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobActionResult {
    pub success: bool,
    pub job_id: String,
    pub message: String,
}

impl JobActionResult {
    fn ok(job_id: &str, message: impl Into<String>) -> Self {
        Self {
            success: true,
            job_id: job_id.to_string(),
            message: message.into(),
        }
    }

    fn failed(job_id: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            job_id: job_id.to_string(),
            message: message.into(),
        }
    }
}

/// One failed item of a bulk action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkError {
    pub job_id: String,
    pub error: String,
}

/// Outcome of a bulk action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResult {
    pub succeeded: usize,
    pub total: usize,
    pub errors: Vec<BulkError>,
}

impl BulkResult {
    fn record(&mut self, job_id: &str, outcome: Result<()>) {
        self.total += 1;
        match outcome {
            Ok(()) => self.succeeded += 1,
            Err(e) => self.errors.push(BulkError {
                job_id: job_id.to_string(),
                error: e.to_string(),
            }),
        }
    }
}

/// Field matched by [`JobManager::search_jobs`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchField {
    #[default]
    ExecutionId,
    UserId,
}

impl std::str::FromStr for SearchField {
    type Err = ConductorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "executionId" | "execution_id" => Ok(SearchField::ExecutionId),
            "userId" | "user_id" => Ok(SearchField::UserId),
            other => Err(ConductorError::Validation(format!("Unknown search field: {}", other))),
        }
    }
}

/// Counts plus the most recent active and failed jobs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsSummary {
    pub counts: JobCounts,
    pub recent_active: Vec<Job>,
    pub recent_failed: Vec<Job>,
}

const SEARCHED_STATES: [JobState; 4] = [
    JobState::Waiting,
    JobState::Active,
    JobState::Failed,
    JobState::Delayed,
];

/// Job lifecycle operations for the control center
pub struct JobManager {
    queue: Arc<dyn JobQueue>,
    executions: Option<Arc<dyn ExecutionStore>>,
    workers: Option<(Arc<WorkerRegistry>, WorkerClient)>,
    config: JobsConfig,
}

impl JobManager {
    pub fn new(queue: Arc<dyn JobQueue>, config: JobsConfig) -> Self {
        Self {
            queue,
            executions: None,
            workers: None,
            config,
        }
    }

    /// Enrich listings with execution records from `store`
    pub fn with_execution_store(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.executions = Some(store);
        self
    }

    /// Stop the execution of a cancelled active job on the worker running it
    pub fn with_worker_control(mut self, registry: Arc<WorkerRegistry>, client: WorkerClient) -> Self {
        self.workers = Some((registry, client));
        self
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    /// Validate and enqueue a job.
    ///
    /// Workflow jobs must carry a graph. A missing execution id is generated.
    pub async fn submit_job(
        &self,
        job_type: &str,
        mut payload: JobPayload,
        priority: JobPriority,
        delay: Option<Duration>,
    ) -> Result<Job> {
        validate_job_type(job_type)?;
        if job_type == job_types::WORKFLOW && payload.workflow.is_none() {
            return Err(ConductorError::Validation(
                "Workflow jobs require a workflow graph".into(),
            ));
        }
        if payload.execution_id.trim().is_empty() {
            payload.execution_id = uuid::Uuid::new_v4().to_string();
        }

        let mut job = NewJob::new(job_type, payload).with_priority(priority);
        if let Some(delay) = delay {
            job = job.with_delay(delay);
        }
        let job = self.queue.add(job).await?;
        tracing::info!(
            "Submitted {} job {} for execution {} ({})",
            job.job_type,
            job.id,
            job.payload.execution_id,
            job.priority
        );
        Ok(job)
    }

    /// Jobs in `state` at positions `start..=end`, newest first
    pub async fn browse_jobs(&self, state: JobState, start: usize, end: usize) -> Result<Vec<JobListing>> {
        let jobs = self.queue.list(state, start, end).await?;
        let mut listings = Vec::with_capacity(jobs.len());
        for job in jobs {
            listings.push(self.enrich(job).await);
        }
        Ok(listings)
    }

    /// One job with its execution metadata
    pub async fn get_job_details(&self, job_id: &str) -> Result<JobListing> {
        let job = self
            .queue
            .get(job_id)
            .await?
            .ok_or_else(|| ConductorError::JobNotFound(job_id.to_string()))?;
        Ok(self.enrich(job).await)
    }

    /// Failed -> waiting
    pub async fn retry_job(&self, job_id: &str) -> JobActionResult {
        let outcome = self.queue.retry(job_id).await;
        action_result(job_id, outcome.map(|_| ()), "Job queued for retry")
    }

    /// Fail an active job and stop its execution, or remove a job that has
    /// not started or already finished
    pub async fn cancel_job(&self, job_id: &str) -> JobActionResult {
        action_result(job_id, self.cancel(job_id).await, "Job cancelled")
    }

    /// Change the priority of a waiting or delayed job
    pub async fn change_job_priority(&self, job_id: &str, priority: JobPriority) -> JobActionResult {
        let outcome = self.queue.update_priority(job_id, priority).await;
        action_result(job_id, outcome.map(|_| ()), format!("Priority changed to {}", priority))
    }

    /// Move a delayed job to waiting now
    pub async fn promote_job(&self, job_id: &str) -> JobActionResult {
        let outcome = self.queue.promote(job_id).await;
        action_result(job_id, outcome.map(|_| ()), "Job promoted")
    }

    /// Delay a waiting job by `delay_ms`
    pub async fn delay_job(&self, job_id: &str, delay_ms: u64) -> JobActionResult {
        if delay_ms == 0 {
            return JobActionResult::failed(job_id, "Delay must be greater than zero");
        }
        let until = match i64::try_from(delay_ms)
            .ok()
            .and_then(|ms| Utc::now().checked_add_signed(chrono::Duration::milliseconds(ms)))
        {
            Some(until) => until,
            None => return JobActionResult::failed(job_id, "Delay is out of range"),
        };
        let outcome = self.queue.move_to_delayed(job_id, until).await;
        action_result(job_id, outcome.map(|_| ()), format!("Job delayed until {}", until))
    }

    /// Find jobs whose execution or user id contains `term`.
    ///
    /// Scans waiting, active, failed and delayed jobs in full, so the cost
    /// grows with the queue size. Results are capped at `search_limit`.
    pub async fn search_jobs(&self, term: &str, field: SearchField) -> Result<Vec<Job>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(ConductorError::Validation("Search term is empty".into()));
        }

        let mut found = Vec::new();
        for state in SEARCHED_STATES {
            for job in self.queue.list(state, 0, usize::MAX).await? {
                let haystack = match field {
                    SearchField::ExecutionId => Some(job.payload.execution_id.as_str()),
                    SearchField::UserId => job.user_id(),
                };
                if haystack.map_or(false, |value| value.contains(term)) {
                    found.push(job);
                    if found.len() >= self.config.search_limit {
                        return Ok(found);
                    }
                }
            }
        }
        Ok(found)
    }

    /// Retry every failed job.
    ///
    /// Fails only when the failed jobs cannot be listed; per-job errors are
    /// collected in the result.
    pub async fn bulk_retry_failed(&self) -> Result<BulkResult> {
        let mut result = BulkResult::default();
        for job in self.queue.list(JobState::Failed, 0, usize::MAX).await? {
            let outcome = self.queue.retry(&job.id).await.map(|_| ());
            result.record(&job.id, outcome);
        }
        tracing::info!("Bulk retry: {}/{} succeeded", result.succeeded, result.total);
        Ok(result)
    }

    /// Cancel each job in `job_ids`
    pub async fn bulk_cancel(&self, job_ids: &[String]) -> BulkResult {
        let mut result = BulkResult::default();
        for id in job_ids {
            let outcome = self.cancel(id).await;
            result.record(id, outcome);
        }
        tracing::info!("Bulk cancel: {}/{} succeeded", result.succeeded, result.total);
        result
    }

    /// Change the priority of each job in `job_ids`
    pub async fn bulk_change_priority(&self, job_ids: &[String], priority: JobPriority) -> BulkResult {
        let mut result = BulkResult::default();
        for id in job_ids {
            let outcome = self.queue.update_priority(id, priority).await.map(|_| ());
            result.record(id, outcome);
        }
        result
    }

    /// Number of jobs per state
    pub async fn get_job_counts(&self) -> Result<JobCounts> {
        let mut counts = JobCounts::default();
        for state in JobState::ALL {
            counts.set(state, self.queue.count(state).await?);
        }
        Ok(counts)
    }

    /// Counts plus a few of the newest active and failed jobs
    pub async fn get_jobs_summary(&self) -> Result<JobsSummary> {
        let counts = self.get_job_counts().await?;
        let Some(last) = self.config.summary_recent.checked_sub(1) else {
            return Ok(JobsSummary {
                counts,
                recent_active: Vec::new(),
                recent_failed: Vec::new(),
            });
        };
        Ok(JobsSummary {
            counts,
            recent_active: self.queue.list(JobState::Active, 0, last).await?,
            recent_failed: self.queue.list(JobState::Failed, 0, last).await?,
        })
    }

    /// Remove completed jobs older than `max_age` (default: the configured grace)
    pub async fn clean_completed_jobs(&self, max_age: Option<Duration>) -> Result<Vec<String>> {
        let grace = max_age.unwrap_or_else(|| self.config.clean_grace());
        let removed = self
            .queue
            .clean(JobState::Completed, grace, self.config.clean_limit)
            .await?;
        tracing::info!("Cleaned {} completed jobs", removed.len());
        Ok(removed)
    }

    /// Register a job that is enqueued on every firing of `cron`.
    ///
    /// Every firing runs under a fresh execution id, so the payload's own
    /// execution id is not kept.
    pub async fn schedule_recurring_job(
        &self,
        job_type: &str,
        mut payload: JobPayload,
        cron: &str,
        priority: JobPriority,
    ) -> Result<RepeatableJob> {
        validate_job_type(job_type)?;
        if job_type == job_types::WORKFLOW && payload.workflow.is_none() {
            return Err(ConductorError::Validation(
                "Recurring workflow jobs require a workflow graph".into(),
            ));
        }
        payload.execution_id.clear();
        let now = Utc::now();
        let next_run = next_cron_run(cron, now)?;

        let repeatable = RepeatableJob {
            key: repeat_key(job_type, cron.trim(), &payload)?,
            job_type: job_type.to_string(),
            payload,
            priority,
            cron: cron.trim().to_string(),
            next_run,
            created_at: now,
        };
        let saved = self.queue.add_repeatable(repeatable).await?;
        tracing::info!("Scheduled repeatable {} (next run {})", saved.key, saved.next_run);
        Ok(saved)
    }

    pub async fn get_repeatable_jobs(&self) -> Result<Vec<RepeatableJob>> {
        self.queue.repeatables().await
    }

    pub async fn remove_repeatable_job(&self, key: &str) -> Result<bool> {
        let removed = self.queue.remove_repeatable(key).await?;
        if removed {
            tracing::info!("Removed repeatable {}", key);
        }
        Ok(removed)
    }

    async fn cancel(&self, job_id: &str) -> Result<()> {
        let job = self
            .queue
            .get(job_id)
            .await?
            .ok_or_else(|| ConductorError::JobNotFound(job_id.to_string()))?;
        if job.state == JobState::Active {
            self.queue.fail(job_id, "cancelled".to_string()).await?;
            self.stop_execution(&job).await;
        } else {
            self.queue.remove(job_id).await?;
        }
        Ok(())
    }

    async fn stop_execution(&self, job: &Job) {
        let (Some((registry, client)), Some(worker_id)) = (&self.workers, job.worker_id.as_deref()) else {
            return;
        };
        let execution_id = &job.payload.execution_id;
        let stopped = match registry.get_worker(worker_id).await {
            Ok(worker) => client
                .stop(&worker.endpoint, execution_id)
                .await
                .map_err(ConductorError::from),
            Err(e) => Err(e),
        };
        match stopped {
            Ok(_) => tracing::info!(
                "Stopping execution {} of cancelled job {} on worker {}",
                execution_id,
                job.id,
                worker_id
            ),
            Err(e) => tracing::warn!(
                "Could not stop execution {} of cancelled job {}: {}",
                execution_id,
                job.id,
                e
            ),
        }
    }

    async fn enrich(&self, job: Job) -> JobListing {
        let Some(store) = &self.executions else {
            return JobListing { job, execution: None };
        };
        let execution = match store.get_record(&job.payload.execution_id).await {
            Ok(record) => record.map(|r| ExecutionSummary {
                user_id: r.user_id,
                current_node: r.current_node,
                status: r.status,
                progress: r.progress,
            }),
            Err(e) => {
                tracing::warn!("Could not load execution for job {}: {}", job.id, e);
                None
            }
        };
        JobListing { job, execution }
    }
}

fn validate_job_type(job_type: &str) -> Result<()> {
    if job_type.trim().is_empty() || job_type.chars().any(char::is_whitespace) {
        return Err(ConductorError::Validation(format!("Invalid job type: '{}'", job_type)));
    }
    Ok(())
}

/// `type:cron:digest`, where the digest is the first 16 hex digits of the
/// payload's SHA-256
fn repeat_key(job_type: &str, cron: &str, payload: &JobPayload) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(payload)?);
    let digest = format!("{:x}", hasher.finalize());
    Ok(format!("{}:{}:{}", job_type, cron, &digest[..16]))
}

fn action_result(job_id: &str, outcome: Result<()>, message: impl Into<String>) -> JobActionResult {
    match outcome {
        Ok(()) => JobActionResult::ok(job_id, message),
        Err(ConductorError::JobNotFound(_)) => JobActionResult::failed(job_id, "Job not found"),
        Err(e) => JobActionResult::failed(job_id, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::queue::InMemoryJobQueue;

    fn manager() -> JobManager {
        JobManager::new(Arc::new(InMemoryJobQueue::new()), JobsConfig::default())
    }

    fn workflow_payload(user: &str) -> JobPayload {
        JobPayload {
            user_id: Some(user.to_string()),
            workflow: Some(serde_json::json!({"nodes": [], "edges": []})),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_workflow() {
        let manager = manager();
        let err = manager
            .submit_job(job_types::WORKFLOW, JobPayload::default(), JobPriority::Normal, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::Validation(_)));
        assert_eq!(manager.get_job_counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_submit_generates_execution_id() {
        let manager = manager();
        let job = manager
            .submit_job(job_types::WORKFLOW, workflow_payload("u1"), JobPriority::High, None)
            .await
            .unwrap();
        assert!(!job.payload.execution_id.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_unsuccessful_result() {
        let result = manager().retry_job("nope").await;
        assert!(!result.success);
        assert_eq!(result.message, "Job not found");
    }

    #[tokio::test]
    async fn test_cancel_waiting_removes_and_active_fails() {
        let manager = manager();
        let waiting = manager
            .submit_job(job_types::EXPORT, JobPayload::default(), JobPriority::Normal, None)
            .await
            .unwrap();
        assert!(manager.cancel_job(&waiting.id).await.success);
        assert!(manager.queue().get(&waiting.id).await.unwrap().is_none());

        let active = manager
            .submit_job(job_types::EXPORT, JobPayload::default(), JobPriority::Normal, None)
            .await
            .unwrap();
        manager.queue().take_next("w1", &[]).await.unwrap();
        assert!(manager.cancel_job(&active.id).await.success);
        let job = manager.queue().get(&active.id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.failed_reason.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_search_by_user() {
        let manager = manager();
        for user in ["alice", "bob", "alice"] {
            manager
                .submit_job(job_types::WORKFLOW, workflow_payload(user), JobPriority::Normal, None)
                .await
                .unwrap();
        }
        let found = manager.search_jobs("ali", SearchField::UserId).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(manager.search_jobs(" ", SearchField::UserId).await.is_err());
    }

    #[tokio::test]
    async fn test_bulk_priority_collects_errors() {
        let manager = manager();
        let job = manager
            .submit_job(job_types::EXPORT, JobPayload::default(), JobPriority::Normal, None)
            .await
            .unwrap();
        let ids = vec![job.id.clone(), "missing".to_string()];

        let result = manager.bulk_change_priority(&ids, JobPriority::Critical).await;
        assert_eq!(result.total, 2);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.errors[0].job_id, "missing");
    }

    #[tokio::test]
    async fn test_schedule_recurring_rejects_bad_cron() {
        let manager = manager();
        let err = manager
            .schedule_recurring_job(job_types::EXPORT, JobPayload::default(), "not cron", JobPriority::Low)
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::Validation(_)));

        let job = manager
            .schedule_recurring_job(job_types::EXPORT, JobPayload::default(), "*/10 * * * *", JobPriority::Low)
            .await
            .unwrap();
        assert!(job.key.starts_with("export:*/10 * * * *:"));
        assert_eq!(manager.get_repeatable_jobs().await.unwrap().len(), 1);
        assert!(manager.remove_repeatable_job(&job.key).await.unwrap());
    }

    #[tokio::test]
    async fn test_recurring_workflow_needs_graph() {
        let manager = manager();
        let err = manager
            .schedule_recurring_job(
                job_types::WORKFLOW,
                JobPayload {
                    execution_id: "fixed".into(),
                    ..Default::default()
                },
                "0 * * * *",
                JobPriority::Normal,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::Validation(_)));
        assert!(manager.get_repeatable_jobs().await.unwrap().is_empty());
    }

    #[test]
    fn test_repeat_key_digest_is_pinned() {
        // keys are persisted in the repeatables table
        let key = repeat_key(job_types::EXPORT, "*/10 * * * *", &JobPayload::default()).unwrap();
        assert_eq!(key, "export:*/10 * * * *:1bb063af00aa5c23");
    }

    #[tokio::test]
    async fn test_summary_with_no_recent_jobs() {
        let manager = JobManager::new(
            Arc::new(InMemoryJobQueue::new()),
            JobsConfig {
                summary_recent: 0,
                ..Default::default()
            },
        );
        let job = manager
            .submit_job(job_types::EXPORT, JobPayload::default(), JobPriority::Normal, None)
            .await
            .unwrap();
        manager.queue().take_next("w1", &[]).await.unwrap();
        manager.queue().fail(&job.id, "boom".into()).await.unwrap();

        let summary = manager.get_jobs_summary().await.unwrap();
        assert_eq!(summary.counts.total(), 1);
        assert!(summary.recent_active.is_empty());
        assert!(summary.recent_failed.is_empty());
    }
}
