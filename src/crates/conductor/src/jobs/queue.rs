//! Job queue abstraction
//!
//! [`JobQueue`] exposes a small set of storage primitives; the lifecycle
//! operations (retry, promote, delay, complete, fail, reprioritise) are
//! default methods built on [`JobQueue::update_job`], so both backends apply
//! identical transition rules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::model::{Job, JobPriority, JobState, NewJob, RepeatableJob};
use crate::{ConductorError, Result};

/// A change applied to one job under the backend's consistency guarantee
pub type JobMutation = Box<dyn FnOnce(&mut Job) -> Result<()> + Send>;

/// Storage and lifecycle operations for queued jobs
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job
    async fn add(&self, job: NewJob) -> Result<Job>;

    /// Fetch a job by id
    async fn get(&self, id: &str) -> Result<Option<Job>>;

    /// Jobs in `state`, newest first, positions `start..=end`
    async fn list(&self, state: JobState, start: usize, end: usize) -> Result<Vec<Job>>;

    /// Number of jobs in `state`
    async fn count(&self, state: JobState) -> Result<u64>;

    /// Apply `mutation` to a job atomically.
    ///
    /// Returns `JobNotFound` when the id is unknown. A concurrent change to
    /// the same job makes the call fail instead of overwriting it.
    async fn update_job(&self, id: &str, mutation: JobMutation) -> Result<Job>;

    /// Delete a job, returning whether it existed
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Claim the best waiting job for `worker_id`.
    ///
    /// Highest priority first, oldest first within a priority. An empty
    /// `job_types` slice accepts any type. No two callers ever receive the
    /// same job.
    async fn take_next(&self, worker_id: &str, job_types: &[String]) -> Result<Option<Job>>;

    /// Move delayed jobs whose delay elapsed back to waiting
    async fn promote_due_delayed(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Delete up to `limit` jobs in `state` that finished more than `grace` ago
    async fn clean(&self, state: JobState, grace: Duration, limit: usize) -> Result<Vec<String>>;

    /// Create or replace a repeatable job
    async fn add_repeatable(&self, job: RepeatableJob) -> Result<RepeatableJob>;

    /// All repeatable jobs, soonest first
    async fn repeatables(&self) -> Result<Vec<RepeatableJob>>;

    /// Delete a repeatable job
    async fn remove_repeatable(&self, key: &str) -> Result<bool>;

    /// Record the next firing time of a repeatable job
    async fn set_repeatable_next_run(&self, key: &str, next_run: DateTime<Utc>) -> Result<bool>;

    /// Failed -> waiting. Completed jobs cannot be retried.
    async fn retry(&self, id: &str) -> Result<Job> {
        self.update_job(
            id,
            Box::new(|job: &mut Job| {
                job.transition(JobState::Waiting)?;
                job.failed_reason = None;
                job.finished_at = None;
                job.processed_at = None;
                job.worker_id = None;
                job.delay_until = None;
                Ok(())
            }),
        )
        .await
    }

    /// Change priority of a job that has not started
    async fn update_priority(&self, id: &str, priority: JobPriority) -> Result<Job> {
        self.update_job(
            id,
            Box::new(move |job: &mut Job| {
                if !matches!(job.state, JobState::Waiting | JobState::Delayed) {
                    return Err(ConductorError::Validation(format!(
                        "Priority of a {} job cannot change",
                        job.state
                    )));
                }
                job.priority = priority;
                Ok(())
            }),
        )
        .await
    }

    /// Delayed -> waiting immediately
    async fn promote(&self, id: &str) -> Result<Job> {
        self.update_job(
            id,
            Box::new(|job: &mut Job| {
                if job.state != JobState::Delayed {
                    return Err(ConductorError::InvalidStateTransition {
                        from: job.state.to_string(),
                        to: JobState::Waiting.to_string(),
                    });
                }
                job.transition(JobState::Waiting)?;
                job.delay_until = None;
                Ok(())
            }),
        )
        .await
    }

    /// Waiting or active -> delayed until `until`
    async fn move_to_delayed(&self, id: &str, until: DateTime<Utc>) -> Result<Job> {
        self.update_job(
            id,
            Box::new(move |job: &mut Job| {
                job.transition(JobState::Delayed)?;
                job.delay_until = Some(until);
                job.worker_id = None;
                job.processed_at = None;
                Ok(())
            }),
        )
        .await
    }

    /// Active -> completed
    async fn complete(&self, id: &str, return_value: Option<serde_json::Value>) -> Result<Job> {
        self.update_job(
            id,
            Box::new(move |job: &mut Job| {
                job.transition(JobState::Completed)?;
                job.finished_at = Some(Utc::now());
                job.return_value = return_value;
                Ok(())
            }),
        )
        .await
    }

    /// Active -> failed
    async fn fail(&self, id: &str, reason: String) -> Result<Job> {
        self.update_job(
            id,
            Box::new(move |job: &mut Job| {
                job.transition(JobState::Failed)?;
                job.finished_at = Some(Utc::now());
                job.failed_reason = Some(reason);
                Ok(())
            }),
        )
        .await
    }
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<String, Job>,
    repeatables: BTreeMap<String, RepeatableJob>,
}

/// Single-process job queue
#[derive(Default)]
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sort newest first with a stable tiebreak
fn newest_first(a: &Job, b: &Job) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn add(&self, job: NewJob) -> Result<Job> {
        let job = job.into_job();
        self.state.lock().jobs.insert(job.id.clone(), job.clone());
        tracing::debug!("Enqueued {} job {} ({})", job.job_type, job.id, job.state);
        Ok(job)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.state.lock().jobs.get(id).cloned())
    }

    async fn list(&self, state: JobState, start: usize, end: usize) -> Result<Vec<Job>> {
        if end < start {
            return Ok(Vec::new());
        }
        let guard = self.state.lock();
        let mut jobs: Vec<Job> = guard
            .jobs
            .values()
            .filter(|j| j.state == state)
            .cloned()
            .collect();
        jobs.sort_by(newest_first);
        Ok(jobs
            .into_iter()
            .skip(start)
            .take((end - start).saturating_add(1))
            .collect())
    }

    async fn count(&self, state: JobState) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .jobs
            .values()
            .filter(|j| j.state == state)
            .count() as u64)
    }

    async fn update_job(&self, id: &str, mutation: JobMutation) -> Result<Job> {
        let mut guard = self.state.lock();
        let job = guard
            .jobs
            .get_mut(id)
            .ok_or_else(|| ConductorError::JobNotFound(id.to_string()))?;

        let mut updated = job.clone();
        mutation(&mut updated)?;
        *job = updated.clone();
        Ok(updated)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.state.lock().jobs.remove(id).is_some())
    }

    async fn take_next(&self, worker_id: &str, job_types: &[String]) -> Result<Option<Job>> {
        let mut guard = self.state.lock();
        let next_id = guard
            .jobs
            .values()
            .filter(|j| j.state == JobState::Waiting)
            .filter(|j| job_types.is_empty() || job_types.iter().any(|t| *t == j.job_type))
            .min_by(|a, b| {
                a.priority
                    .rank()
                    .cmp(&b.priority.rank())
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
            .map(|j| j.id.clone());

        let Some(id) = next_id else {
            return Ok(None);
        };
        let job = match guard.jobs.get_mut(&id) {
            Some(job) => job,
            None => return Ok(None),
        };
        job.transition(JobState::Active)?;
        job.processed_at = Some(Utc::now());
        job.worker_id = Some(worker_id.to_string());
        job.attempts_made += 1;
        Ok(Some(job.clone()))
    }

    async fn promote_due_delayed(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut guard = self.state.lock();
        let mut promoted = 0;
        for job in guard.jobs.values_mut() {
            if job.state == JobState::Delayed && job.delay_until.map_or(false, |t| t <= now) {
                job.state = JobState::Waiting;
                job.delay_until = None;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn clean(&self, state: JobState, grace: Duration, limit: usize) -> Result<Vec<String>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());
        let mut guard = self.state.lock();

        let mut candidates: Vec<(DateTime<Utc>, String)> = guard
            .jobs
            .values()
            .filter(|j| j.state == state)
            .map(|j| (j.finished_at.unwrap_or(j.created_at), j.id.clone()))
            .filter(|(finished, _)| *finished < cutoff)
            .collect();
        candidates.sort();

        let removed: Vec<String> = candidates.into_iter().take(limit).map(|(_, id)| id).collect();
        for id in &removed {
            guard.jobs.remove(id);
        }
        Ok(removed)
    }

    async fn add_repeatable(&self, job: RepeatableJob) -> Result<RepeatableJob> {
        self.state
            .lock()
            .repeatables
            .insert(job.key.clone(), job.clone());
        Ok(job)
    }

    async fn repeatables(&self) -> Result<Vec<RepeatableJob>> {
        let mut jobs: Vec<RepeatableJob> = self.state.lock().repeatables.values().cloned().collect();
        jobs.sort_by(|a, b| a.next_run.cmp(&b.next_run));
        Ok(jobs)
    }

    async fn remove_repeatable(&self, key: &str) -> Result<bool> {
        Ok(self.state.lock().repeatables.remove(key).is_some())
    }

    async fn set_repeatable_next_run(&self, key: &str, next_run: DateTime<Utc>) -> Result<bool> {
        match self.state.lock().repeatables.get_mut(key) {
            Some(job) => {
                job.next_run = next_run;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
