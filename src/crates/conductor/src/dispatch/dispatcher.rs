//! Direct-call dispatch loop
//!
//! Each pass claims the oldest waiting jobs, routes each one to a worker
//! and posts it to the worker's `/execute` without waiting for the result.
//! A worker that is full or unreachable gets the job back as delayed with
//! exponential backoff; an empty fleet ends the pass early so the jobs stay
//! waiting.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tooling::async_utils::retry::RetryPolicy;

use super::client::{DispatchError, WorkerClient};
use crate::api::models::worker::ExecuteRequest;
use crate::jobs::{Job, JobQueue, JobState};
use crate::routing::RoutingEngine;
use crate::{ConductorError, Result};

/// `[dispatch]` section of the control center config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Run the dispatch loop; disable when every worker pulls from the queue
    pub enabled: bool,
    pub interval_ms: u64,
    /// Waiting jobs considered per pass
    pub batch_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
            batch_size: 20,
            request_timeout_secs: 10,
        }
    }
}

impl DispatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(10))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// What one pass did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub dispatched: usize,
    pub requeued: usize,
    pub failed: usize,
    /// The pass stopped because no healthy worker was available
    pub no_workers: bool,
}

/// Pushes waiting jobs to workers chosen by the routing engine
pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    routing: Arc<RoutingEngine>,
    client: WorkerClient,
    config: DispatchConfig,
    backoff: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        routing: Arc<RoutingEngine>,
        config: DispatchConfig,
    ) -> std::result::Result<Self, DispatchError> {
        Ok(Self {
            queue,
            routing,
            client: WorkerClient::new(config.request_timeout())?,
            config,
            backoff: RetryPolicy::dispatch(),
        })
    }

    /// Backoff for requeued jobs; `max_attempts` bounds dispatch attempts per job
    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run one dispatch pass
    pub async fn dispatch_once(&self) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        for job in self.next_batch().await? {
            let worker = match self.routing.select_worker(&job).await {
                Ok(worker) => worker,
                Err(ConductorError::NoWorkers(reason)) => {
                    tracing::debug!("Dispatch paused: {}", reason);
                    report.no_workers = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!("Could not route job {}: {}", job.id, e);
                    continue;
                }
            };

            let claimed = match self.claim(&job.id, &worker.id).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    tracing::debug!("Job {} was taken before dispatch: {}", job.id, e);
                    continue;
                }
            };

            let started = Instant::now();
            let outcome = self
                .client
                .execute(&worker.endpoint, &ExecuteRequest::from_job(&claimed))
                .await;
            match outcome {
                Ok(_) => {
                    let latency = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
                    self.routing.track_latency(&worker.id, latency);
                    tracing::info!(
                        "Dispatched job {} (execution {}) to worker {} in {}ms",
                        claimed.id,
                        claimed.payload.execution_id,
                        worker.id,
                        latency
                    );
                    report.dispatched += 1;
                }
                Err(e) if e.is_retryable() => {
                    if self.requeue(&claimed, &e).await? {
                        report.requeued += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("Worker {} refused job {}: {}", worker.id, claimed.id, e);
                    self.queue.fail(&claimed.id, e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Dispatch on the configured interval until the task is aborted
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match self.dispatch_once().await {
                    Ok(report) if report.dispatched + report.requeued + report.failed > 0 => {
                        tracing::debug!("Dispatch pass: {:?}", report);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Dispatch pass failed: {}", e),
                }
            }
        })
    }

    /// Oldest waiting jobs, highest priority first
    async fn next_batch(&self) -> Result<Vec<Job>> {
        let batch = self.config.batch_size.max(1);
        let waiting = self.queue.count(JobState::Waiting).await? as usize;
        if waiting == 0 {
            return Ok(Vec::new());
        }
        let start = waiting.saturating_sub(batch);
        let mut jobs = self.queue.list(JobState::Waiting, start, waiting - 1).await?;
        jobs.sort_by_key(|job| (job.priority.rank(), job.created_at));
        Ok(jobs)
    }

    async fn claim(&self, job_id: &str, worker_id: &str) -> Result<Job> {
        let worker_id = worker_id.to_string();
        self.queue
            .update_job(
                job_id,
                Box::new(move |job: &mut Job| {
                    if job.state != JobState::Waiting {
                        return Err(ConductorError::InvalidStateTransition {
                            from: job.state.to_string(),
                            to: JobState::Active.to_string(),
                        });
                    }
                    job.transition(JobState::Active)?;
                    job.worker_id = Some(worker_id);
                    job.processed_at = Some(Utc::now());
                    job.attempts_made = job.attempts_made.saturating_add(1);
                    Ok(())
                }),
            )
            .await
    }

    /// Delay the job for another attempt, or fail it once attempts run out
    async fn requeue(&self, job: &Job, cause: &DispatchError) -> Result<bool> {
        let attempts = job.attempts_made as usize;
        if !self.backoff.should_retry(attempts) {
            tracing::warn!("Giving up on job {} after {} dispatch attempts: {}", job.id, attempts, cause);
            self.queue
                .fail(&job.id, format!("dispatch failed after {} attempts: {}", attempts, cause))
                .await?;
            return Ok(false);
        }

        let delay = self.backoff.calculate_delay(attempts.saturating_sub(1));
        let until = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
        self.queue.move_to_delayed(&job.id, until).await?;
        tracing::info!("Requeued job {} for {:?}: {}", job.id, delay, cause);
        Ok(true)
    }
}
