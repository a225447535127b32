use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use conductor::config::WorkerConfig;
use conductor::db::DatabaseConnection;
use conductor::execution::{ExecutionManager, InMemoryExecutionStore, NodeRegistry, WorkflowExecutionEngine};
use conductor::jobs::{
    job_types, InMemoryJobQueue, Job, JobManager, JobMutation, JobPayload, JobPriority, JobQueue, JobState,
    JobsConfig, NewJob, RecurringScheduler, RepeatableJob, SqliteJobQueue,
};
use conductor::registry::{InMemoryRecordStore, RegistryConfig, WorkerRegistry};
use conductor::worker::WorkerRuntime;
use conductor::{ConductorError, Result};

async fn sqlite_queue() -> SqliteJobQueue {
    let db = DatabaseConnection::in_memory().await.unwrap();
    db.run_migrations().await.unwrap();
    SqliteJobQueue::new(db)
}

fn payload(execution_id: &str) -> JobPayload {
    JobPayload {
        execution_id: execution_id.into(),
        workflow: Some(serde_json::json!({"nodes": [], "edges": []})),
        ..Default::default()
    }
}

/// Claim and fail `count` jobs, returning their ids
async fn failed_jobs(queue: &dyn JobQueue, count: usize) -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..count {
        queue
            .add(NewJob::new(job_types::WORKFLOW, payload(&format!("exec-{}", i))))
            .await
            .unwrap();
        let job = queue.take_next("worker-1", &[]).await.unwrap().unwrap();
        queue.fail(&job.id, "provider timeout".into()).await.unwrap();
        ids.push(job.id);
    }
    ids
}

/// Refuses every change to the listed jobs
struct RefusingQueue {
    inner: SqliteJobQueue,
    refused: parking_lot::Mutex<HashSet<String>>,
}

#[async_trait]
impl JobQueue for RefusingQueue {
    async fn add(&self, job: NewJob) -> Result<Job> {
        self.inner.add(job).await
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        self.inner.get(id).await
    }

    async fn list(&self, state: JobState, start: usize, end: usize) -> Result<Vec<Job>> {
        self.inner.list(state, start, end).await
    }

    async fn count(&self, state: JobState) -> Result<u64> {
        self.inner.count(state).await
    }

    async fn update_job(&self, id: &str, mutation: JobMutation) -> Result<Job> {
        if self.refused.lock().contains(id) {
            return Err(ConductorError::Store(format!("row {} is locked", id)));
        }
        self.inner.update_job(id, mutation).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.inner.remove(id).await
    }

    async fn take_next(&self, worker_id: &str, job_types: &[String]) -> Result<Option<Job>> {
        self.inner.take_next(worker_id, job_types).await
    }

    async fn promote_due_delayed(&self, now: DateTime<Utc>) -> Result<u64> {
        self.inner.promote_due_delayed(now).await
    }

    async fn clean(&self, state: JobState, grace: Duration, limit: usize) -> Result<Vec<String>> {
        self.inner.clean(state, grace, limit).await
    }

    async fn add_repeatable(&self, job: RepeatableJob) -> Result<RepeatableJob> {
        self.inner.add_repeatable(job).await
    }

    async fn repeatables(&self) -> Result<Vec<RepeatableJob>> {
        self.inner.repeatables().await
    }

    async fn remove_repeatable(&self, key: &str) -> Result<bool> {
        self.inner.remove_repeatable(key).await
    }

    async fn set_repeatable_next_run(&self, key: &str, next_run: DateTime<Utc>) -> Result<bool> {
        self.inner.set_repeatable_next_run(key, next_run).await
    }
}

#[tokio::test]
async fn test_completed_job_never_returns_to_waiting() {
    let queue = Arc::new(sqlite_queue().await);
    let manager = JobManager::new(queue.clone(), JobsConfig::default());

    let job = manager
        .submit_job(job_types::WORKFLOW, payload("exec-done"), JobPriority::Normal, None)
        .await
        .unwrap();
    let claimed = queue.take_next("worker-1", &[]).await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id);
    queue.complete(&job.id, Some(serde_json::json!({"ok": true}))).await.unwrap();

    let err = queue
        .update_job(&job.id, Box::new(|job: &mut Job| job.transition(JobState::Waiting)))
        .await
        .unwrap_err();
    assert!(matches!(err, ConductorError::InvalidStateTransition { .. }));

    assert!(!manager.retry_job(&job.id).await.success);
    assert!(!manager.promote_job(&job.id).await.success);
    assert!(!manager.delay_job(&job.id, 1_000).await.success);

    let stored = queue.get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Completed);
}

#[tokio::test]
async fn test_failed_job_retries_back_to_waiting() {
    let queue = Arc::new(sqlite_queue().await);
    let manager = JobManager::new(queue.clone(), JobsConfig::default());
    let ids = failed_jobs(queue.as_ref(), 1).await;

    let result = manager.retry_job(&ids[0]).await;
    assert!(result.success, "{}", result.message);

    let job = queue.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Waiting);
    assert!(job.failed_reason.is_none());
    assert!(job.worker_id.is_none());
}

#[tokio::test]
async fn test_bulk_retry_reports_partial_failures() {
    let queue = Arc::new(RefusingQueue {
        inner: sqlite_queue().await,
        refused: parking_lot::Mutex::new(HashSet::new()),
    });
    let ids = failed_jobs(queue.as_ref(), 5).await;
    queue.refused.lock().extend(ids[..2].iter().cloned());

    let manager = JobManager::new(queue.clone(), JobsConfig::default());
    let result = manager.bulk_retry_failed().await.unwrap();

    assert_eq!(result.total, 5);
    assert_eq!(result.succeeded, 3);
    assert_eq!(result.errors.len(), 2);
    let refused: HashSet<&String> = ids[..2].iter().collect();
    assert!(result.errors.iter().all(|e| refused.contains(&e.job_id)));

    assert_eq!(queue.count(JobState::Waiting).await.unwrap(), 3);
    assert_eq!(queue.count(JobState::Failed).await.unwrap(), 2);
}

#[tokio::test]
async fn test_bulk_retry_surfaces_queue_outage() {
    let db = DatabaseConnection::in_memory().await.unwrap();
    db.run_migrations().await.unwrap();
    let manager = JobManager::new(Arc::new(SqliteJobQueue::new(db.clone())), JobsConfig::default());
    db.close().await;

    let err = manager.bulk_retry_failed().await.unwrap_err();
    assert!(matches!(err, ConductorError::Store(_)));
}

#[tokio::test]
async fn test_recurring_workflow_fires_run_under_fresh_executions() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let manager = JobManager::new(queue.clone(), JobsConfig::default());
    let recurring = JobPayload {
        execution_id: "nightly".into(),
        workflow: Some(serde_json::json!({
            "nodes": [
                {"id": "in", "type": "input", "config": {"field": "topic"}},
                {"id": "digest", "type": "template", "config": {"template": "Digest of {{in}}"}}
            ],
            "edges": [{"source": "in", "target": "digest"}]
        })),
        inputs: serde_json::json!({"topic": "builds"}),
        ..Default::default()
    };
    let scheduled = manager
        .schedule_recurring_job(job_types::WORKFLOW, recurring, "* * * * * *", JobPriority::Normal)
        .await
        .unwrap();
    assert!(scheduled.payload.execution_id.is_empty());

    let engine = Arc::new(WorkflowExecutionEngine::new(
        Arc::new(InMemoryExecutionStore::new()),
        NodeRegistry::with_builtins(),
    ));
    let runtime = WorkerRuntime::new(
        WorkerConfig {
            worker_id: "w-cron".into(),
            ..Default::default()
        },
        ExecutionManager::new(engine, 2),
        Arc::new(WorkerRegistry::new(
            Arc::new(InMemoryRecordStore::new()),
            RegistryConfig::default(),
        )),
        queue.clone(),
    );
    let scheduler = RecurringScheduler::new(queue.clone(), Duration::from_secs(30));

    let first = scheduled.next_run;
    for (fired, now) in [first, first + chrono::Duration::seconds(1)].into_iter().enumerate() {
        assert_eq!(scheduler.tick(now).await.unwrap(), 1);
        assert_eq!(runtime.poll_queue().await.unwrap(), 1);
        let mut done = 0;
        for _ in 0..200 {
            done = queue.count(JobState::Completed).await.unwrap();
            if done == fired as u64 + 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(done, fired as u64 + 1);
    }

    let completed = queue.list(JobState::Completed, 0, 10).await.unwrap();
    let executions: HashSet<&str> = completed.iter().map(|j| j.payload.execution_id.as_str()).collect();
    assert_eq!(executions.len(), 2);
    assert!(!executions.contains("") && !executions.contains("nightly"));
    assert_eq!(queue.count(JobState::Failed).await.unwrap(), 0);
}

#[tokio::test]
async fn test_priority_orders_claims() {
    let queue = Arc::new(sqlite_queue().await);
    let manager = JobManager::new(queue.clone(), JobsConfig::default());

    let low = manager
        .submit_job(job_types::WORKFLOW, payload("exec-low"), JobPriority::Low, None)
        .await
        .unwrap();
    let critical = manager
        .submit_job(job_types::WORKFLOW, payload("exec-critical"), JobPriority::Critical, None)
        .await
        .unwrap();

    let first = queue.take_next("worker-1", &[]).await.unwrap().unwrap();
    let second = queue.take_next("worker-1", &[]).await.unwrap().unwrap();
    assert_eq!(first.id, critical.id);
    assert_eq!(second.id, low.id);
    assert!(queue.take_next("worker-1", &[]).await.unwrap().is_none());
}
