//! Worker process runtime
//!
//! Hosts the [`ExecutionManager`], keeps the worker's registry record fresh
//! and, when queue mode is on, pulls jobs of the accepted types from the
//! shared queue whenever an execution slot is free. Every execution tied
//! to a queue job completes or fails that job when it ends; a stopped one
//! hands the job back to the queue so a later attempt resumes it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::models::worker::ExecuteRequest;
use crate::config::WorkerConfig;
use crate::execution::{
    ExecutionCommand, ExecutionManager, ExecutionRequest, ExecutionResult, ExecutionStatus, LoadSnapshot,
    ResumeRequest,
};
use crate::jobs::{JobQueue, JobState};
use crate::registry::{MetricsSource, Worker, WorkerMetrics, WorkerRegistry, WorkerType};
use crate::worker::ResourceSampler;
use crate::{ConductorError, Result};

/// Delay before a job handed back to the queue becomes claimable again
const REQUEUE_DELAY_SECS: i64 = 1;

#[derive(Default)]
struct JobStats {
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Counts an execution from admission until its queue job is settled
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `GET /status` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatusView {
    pub worker_id: String,
    pub worker_type: WorkerType,
    pub queue_enabled: bool,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub load: LoadSnapshot,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
}

pub struct WorkerRuntime {
    config: WorkerConfig,
    manager: ExecutionManager,
    registry: Arc<WorkerRegistry>,
    queue: Arc<dyn JobQueue>,
    stats: Arc<JobStats>,
    resources: Arc<ResourceSampler>,
    in_flight: Arc<AtomicUsize>,
    started_at: DateTime<Utc>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerRuntime {
    pub fn new(
        config: WorkerConfig,
        manager: ExecutionManager,
        registry: Arc<WorkerRegistry>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            config,
            manager,
            registry,
            queue,
            stats: Arc::new(JobStats::default()),
            resources: Arc::new(ResourceSampler::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            started_at: Utc::now(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn manager(&self) -> &ExecutionManager {
        &self.manager
    }

    /// Registry record with current metrics
    pub fn worker_record(&self) -> Worker {
        let mut worker = self.config.to_worker();
        worker.metrics = current_metrics(&self.manager, &self.stats, &self.resources);
        worker
    }

    /// Register, then start the heartbeat, stuck-execution cleanup and,
    /// in queue mode, the pull loop
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.registry
            .register_self(
                &self.worker_record(),
                Some(heartbeat_metrics(&self.manager, &self.stats, &self.resources)),
            )
            .await?;

        let mut tasks = self.tasks.lock();
        tasks.push(
            self.manager
                .spawn_cleanup(self.config.stuck_timeout() / 4, self.config.stuck_timeout()),
        );
        if self.config.queue_enabled {
            tasks.push(self.spawn_queue_loop());
        }
        tracing::info!(
            "Worker {} ({}) ready with {} slots, queue {}",
            self.config.worker_id,
            self.config.worker_type,
            self.manager.max_concurrent(),
            if self.config.queue_enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Stop background tasks and remove the registry record.
    ///
    /// Running executions are asked to stop at their next node boundary and
    /// given up to the configured shutdown timeout to record where they
    /// stopped and hand their jobs back.
    pub async fn shutdown(&self) -> Result<()> {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        for execution_id in self.manager.load().executions {
            if let Err(e) = self.manager.stop(&execution_id) {
                tracing::debug!("Could not stop {} on shutdown: {}", execution_id, e);
            }
        }
        if !self.drain(self.config.shutdown_timeout()).await {
            tracing::warn!(
                "{} executions still running after {:?}",
                self.in_flight(),
                self.config.shutdown_timeout()
            );
        }
        self.registry.deregister_self(&self.config.worker_id).await?;
        Ok(())
    }

    /// Executions admitted whose queue job is not settled yet
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until nothing is in flight. Returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let idle = async {
            while self.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }

    /// Run an execution to its end, settling its queue job
    pub async fn run(&self, command: ExecutionCommand, job_id: Option<String>) -> Result<ExecutionResult> {
        let _in_flight = InFlight::enter(&self.in_flight);
        let outcome = self.manager.run(command).await;
        settle(&self.queue, &self.stats, job_id.as_deref(), &outcome).await;
        outcome
    }

    /// Admit an execution and run it in the background.
    ///
    /// Admission errors (capacity, duplicate id) are returned immediately.
    pub fn spawn(&self, command: ExecutionCommand, job_id: Option<String>) -> Result<JoinHandle<()>> {
        let handle = self.manager.spawn(command)?;
        let in_flight = InFlight::enter(&self.in_flight);
        let queue = self.queue.clone();
        let stats = self.stats.clone();
        Ok(tokio::spawn(async move {
            let _in_flight = in_flight;
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(ConductorError::General(format!("execution task failed: {}", e))));
            settle(&queue, &stats, job_id.as_deref(), &outcome).await;
        }))
    }

    /// Command for a queue job's execution.
    ///
    /// An execution id with a record left by an earlier attempt is resumed
    /// from its checkpoints instead of started again.
    pub async fn job_command(&self, request: ExecutionRequest) -> Result<ExecutionCommand> {
        let id = request.execution_id.clone();
        let Some(record) = self.manager.engine().store().get_record(&id).await? else {
            return Ok(ExecutionCommand::Start(request));
        };
        if record.status == ExecutionStatus::Completed.as_str() {
            return Err(ConductorError::Validation(format!("Execution {} already completed", id)));
        }
        tracing::info!("Resuming {} execution {} for job {:?}", record.status, id, request.job_id);
        Ok(ExecutionCommand::Resume(ResumeRequest {
            execution_id: id,
            workflow: request.workflow,
            inputs: request.inputs,
            regeneration: None,
        }))
    }

    /// Claim queued jobs while execution slots are free. Returns how many started.
    pub async fn poll_queue(&self) -> Result<usize> {
        let job_types = self.config.accepted_job_types();
        let mut started = 0;

        while self.manager.load().available > 0 {
            let Some(job) = self.queue.take_next(&self.config.worker_id, &job_types).await? else {
                break;
            };

            let request = match ExecuteRequest::from_job(&job).into_execution_request() {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!("Queued job {} is not runnable: {}", job.id, e);
                    self.queue.fail(&job.id, e.to_string()).await?;
                    continue;
                }
            };

            let command = match self.job_command(request).await {
                Ok(command) => command,
                Err(e) if e.is_transient() => {
                    self.queue.move_to_delayed(&job.id, requeue_at()).await?;
                    break;
                }
                Err(e) => {
                    self.queue.fail(&job.id, e.to_string()).await?;
                    continue;
                }
            };

            match self.spawn(command, Some(job.id.clone())) {
                Ok(_) => {
                    tracing::info!("Picked up {} job {} from the queue", job.job_type, job.id);
                    started += 1;
                }
                Err(e) if e.is_transient() => {
                    self.queue.move_to_delayed(&job.id, requeue_at()).await?;
                    break;
                }
                Err(e) => {
                    self.queue.fail(&job.id, e.to_string()).await?;
                }
            }
        }
        Ok(started)
    }

    pub fn status(&self) -> WorkerStatusView {
        WorkerStatusView {
            worker_id: self.config.worker_id.clone(),
            worker_type: self.config.worker_type,
            queue_enabled: self.config.queue_enabled,
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            load: self.manager.load(),
            completed_jobs: self.stats.completed.load(Ordering::Relaxed),
            failed_jobs: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    fn spawn_queue_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(runtime.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = runtime.poll_queue().await {
                    tracing::warn!("Queue poll failed: {}", e);
                }
            }
        })
    }
}

fn current_metrics(manager: &ExecutionManager, stats: &JobStats, resources: &ResourceSampler) -> WorkerMetrics {
    let mut metrics = WorkerMetrics {
        active_jobs: manager.active() as u32,
        completed_jobs: stats.completed.load(Ordering::Relaxed),
        failed_jobs: stats.failed.load(Ordering::Relaxed),
        ..Default::default()
    };
    resources.fill(&mut metrics);
    metrics
}

fn heartbeat_metrics(
    manager: &ExecutionManager,
    stats: &Arc<JobStats>,
    resources: &Arc<ResourceSampler>,
) -> MetricsSource {
    let manager = manager.clone();
    let stats = stats.clone();
    let resources = resources.clone();
    Arc::new(move || current_metrics(&manager, &stats, &resources))
}

fn requeue_at() -> DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(REQUEUE_DELAY_SECS)
}

enum Settlement {
    Completed(serde_json::Value),
    Failed(String),
    /// Stopped between nodes; the job goes back to the queue
    Requeue,
}

/// Count the outcome and settle the queue job it belongs to
async fn settle(
    queue: &Arc<dyn JobQueue>,
    stats: &JobStats,
    job_id: Option<&str>,
    outcome: &Result<ExecutionResult>,
) {
    let settlement = match outcome {
        Ok(result) if result.status == ExecutionStatus::Completed => Settlement::Completed(json!({
            "executionId": result.execution_id,
            "status": result.status,
            "completedNodes": result.completed_nodes,
        })),
        Ok(result) if result.status == ExecutionStatus::Stopped => Settlement::Requeue,
        Ok(result) => Settlement::Failed(
            result
                .error
                .clone()
                .unwrap_or_else(|| format!("execution ended as {}", result.status)),
        ),
        Err(e) => Settlement::Failed(e.to_string()),
    };
    match &settlement {
        Settlement::Completed(_) => {
            stats.completed.fetch_add(1, Ordering::Relaxed);
        }
        Settlement::Failed(_) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        Settlement::Requeue => {}
    }

    let Some(job_id) = job_id else {
        return;
    };
    let settled = match settlement {
        Settlement::Completed(summary) => queue.complete(job_id, Some(summary)).await,
        Settlement::Failed(reason) => queue.fail(job_id, reason).await,
        Settlement::Requeue => queue.move_to_delayed(job_id, requeue_at()).await,
    };
    match settled {
        Ok(job) if job.state == JobState::Delayed => {
            tracing::info!("Stopped job {} returned to the queue", job_id);
        }
        Ok(_) => {}
        // cancelled or removed while the execution was stopping
        Err(e @ (ConductorError::InvalidStateTransition { .. } | ConductorError::JobNotFound(_))) => {
            tracing::debug!("Queue job {} left as is: {}", job_id, e);
        }
        Err(e) => tracing::warn!("Could not settle queue job {}: {}", job_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{
        InMemoryExecutionStore, NodeContext, NodeError, NodeHandler, NodeOutput, NodeRegistry,
        WorkflowExecutionEngine, WorkflowNode,
    };
    use crate::jobs::{InMemoryJobQueue, JobPayload, JobState, NewJob};
    use crate::registry::{InMemoryRecordStore, RegistryConfig};
    use tokio::sync::Notify;

    /// Fails its first call only
    #[derive(Default)]
    struct FailOnce {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl NodeHandler for FailOnce {
        async fn execute(&self, _node: &WorkflowNode, _ctx: &NodeContext) -> std::result::Result<NodeOutput, NodeError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(NodeError::new("provider unavailable"));
            }
            Ok(NodeOutput::text("second try"))
        }
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl NodeHandler for Counting {
        async fn execute(&self, _node: &WorkflowNode, _ctx: &NodeContext) -> std::result::Result<NodeOutput, NodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(NodeOutput::text("counted"))
        }
    }

    fn gated_pair() -> serde_json::Value {
        json!({
            "nodes": [
                {"id": "wait", "type": "gate"},
                {"id": "after", "type": "template", "config": {"template": "after {{wait}}"}}
            ],
            "edges": [{"source": "wait", "target": "after"}]
        })
    }

    struct Gate(Arc<Notify>);

    #[async_trait::async_trait]
    impl NodeHandler for Gate {
        async fn execute(&self, _node: &WorkflowNode, _ctx: &NodeContext) -> std::result::Result<NodeOutput, NodeError> {
            self.0.notified().await;
            Ok(NodeOutput::text("opened"))
        }
    }

    fn runtime(max_concurrent: usize) -> (Arc<InMemoryJobQueue>, Arc<WorkerRegistry>, Arc<WorkerRuntime>) {
        runtime_with_nodes(max_concurrent, NodeRegistry::with_builtins())
    }

    fn runtime_with_nodes(
        max_concurrent: usize,
        nodes: NodeRegistry,
    ) -> (Arc<InMemoryJobQueue>, Arc<WorkerRegistry>, Arc<WorkerRuntime>) {
        let engine = Arc::new(WorkflowExecutionEngine::new(Arc::new(InMemoryExecutionStore::new()), nodes));
        let registry = Arc::new(WorkerRegistry::new(
            Arc::new(InMemoryRecordStore::new()),
            RegistryConfig::default(),
        ));
        let queue = Arc::new(InMemoryJobQueue::new());
        let config = WorkerConfig {
            worker_id: "w-test".into(),
            max_concurrent: max_concurrent as u32,
            capacity: max_concurrent as u32,
            ..Default::default()
        };
        let runtime = WorkerRuntime::new(
            config,
            ExecutionManager::new(engine, max_concurrent),
            registry.clone(),
            queue.clone(),
        );
        (queue, registry, Arc::new(runtime))
    }

    fn job(execution_id: &str, workflow: serde_json::Value) -> NewJob {
        NewJob::new(
            "workflow",
            JobPayload {
                execution_id: execution_id.into(),
                workflow: Some(workflow),
                inputs: json!({"topic": "queues"}),
                ..Default::default()
            },
        )
    }

    fn good_graph() -> serde_json::Value {
        json!({
            "nodes": [
                {"id": "in", "type": "input", "config": {"field": "topic"}},
                {"id": "draft", "type": "template", "config": {"template": "About {{in}}"}}
            ],
            "edges": [{"source": "in", "target": "draft"}]
        })
    }

    async fn wait_for_state(queue: &InMemoryJobQueue, id: &str, state: JobState) -> crate::jobs::Job {
        for _ in 0..200 {
            let job = queue.get(id).await.unwrap().unwrap();
            if job.state == state {
                return job;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("job {} never reached {}", id, state);
    }

    #[tokio::test]
    async fn test_queue_job_completes() {
        let (queue, _, runtime) = runtime(2);
        let added = queue.add(job("e1", good_graph())).await.unwrap();

        assert_eq!(runtime.poll_queue().await.unwrap(), 1);
        let done = wait_for_state(&queue, &added.id, JobState::Completed).await;
        assert_eq!(done.worker_id.as_deref(), Some("w-test"));
        assert_eq!(done.return_value.unwrap()["completedNodes"], json!(["in", "draft"]));
        assert_eq!(runtime.status().completed_jobs, 1);
    }

    #[tokio::test]
    async fn test_failed_execution_fails_job() {
        let (queue, _, runtime) = runtime(2);
        let graph = json!({"nodes": [{"id": "in", "type": "input", "config": {"field": "missing"}}]});
        let added = queue.add(job("e1", graph)).await.unwrap();

        runtime.poll_queue().await.unwrap();
        let failed = wait_for_state(&queue, &added.id, JobState::Failed).await;
        assert!(failed.failed_reason.unwrap().contains("missing"));
        assert_eq!(runtime.status().failed_jobs, 1);
    }

    #[tokio::test]
    async fn test_unrunnable_job_fails_without_slot() {
        let (queue, _, runtime) = runtime(1);
        let added = queue
            .add(NewJob::new("workflow", JobPayload { execution_id: "e1".into(), ..Default::default() }))
            .await
            .unwrap();

        assert_eq!(runtime.poll_queue().await.unwrap(), 0);
        assert_eq!(queue.get(&added.id).await.unwrap().unwrap().state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_poll_stops_at_capacity() {
        let gate = Arc::new(Notify::new());
        let mut nodes = NodeRegistry::with_builtins();
        nodes.register("gate", Arc::new(Gate(gate.clone())));
        let (queue, _, runtime) = runtime_with_nodes(1, nodes);

        let gated = json!({"nodes": [{"id": "wait", "type": "gate"}]});
        let first = queue.add(job("e1", gated.clone())).await.unwrap();
        let second = queue.add(job("e2", gated)).await.unwrap();

        assert_eq!(runtime.poll_queue().await.unwrap(), 1);
        assert_eq!(queue.get(&second.id).await.unwrap().unwrap().state, JobState::Waiting);

        gate.notify_one();
        wait_for_state(&queue, &first.id, JobState::Completed).await;
        while runtime.manager().load().available == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(runtime.poll_queue().await.unwrap(), 1);
        gate.notify_one();
        wait_for_state(&queue, &second.id, JobState::Completed).await;
    }

    #[tokio::test]
    async fn test_stopped_job_returns_to_queue_and_resumes() {
        let gate = Arc::new(Notify::new());
        let mut nodes = NodeRegistry::with_builtins();
        nodes.register("gate", Arc::new(Gate(gate.clone())));
        let (queue, _, runtime) = runtime_with_nodes(1, nodes);
        let added = queue.add(job("e-stop", gated_pair())).await.unwrap();

        assert_eq!(runtime.poll_queue().await.unwrap(), 1);
        runtime.manager().stop("e-stop").unwrap();
        gate.notify_one();

        let requeued = wait_for_state(&queue, &added.id, JobState::Delayed).await;
        assert!(requeued.failed_reason.is_none());
        assert!(requeued.worker_id.is_none());
        assert_eq!(runtime.status().failed_jobs, 0);
        assert_eq!(runtime.status().completed_jobs, 0);

        // the next attempt continues after the gate instead of waiting on it again
        queue.promote(&added.id).await.unwrap();
        assert_eq!(runtime.poll_queue().await.unwrap(), 1);
        let done = wait_for_state(&queue, &added.id, JobState::Completed).await;
        assert_eq!(done.return_value.unwrap()["completedNodes"], json!(["wait", "after"]));
    }

    #[tokio::test]
    async fn test_cancelled_job_stays_failed_when_execution_stops() {
        let gate = Arc::new(Notify::new());
        let mut nodes = NodeRegistry::with_builtins();
        nodes.register("gate", Arc::new(Gate(gate.clone())));
        let (queue, _, runtime) = runtime_with_nodes(1, nodes);
        let added = queue.add(job("e-cancel", gated_pair())).await.unwrap();

        runtime.poll_queue().await.unwrap();
        queue.fail(&added.id, "cancelled".into()).await.unwrap();
        runtime.manager().stop("e-cancel").unwrap();
        gate.notify_one();

        while runtime.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
        let job = queue.get(&added.id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.failed_reason.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_retried_job_resumes_after_completed_nodes() {
        let counting = Arc::new(Counting::default());
        let mut nodes = NodeRegistry::with_builtins();
        nodes.register("count", counting.clone());
        nodes.register("flaky", Arc::new(FailOnce::default()));
        let (queue, _, runtime) = runtime_with_nodes(1, nodes);
        let graph = json!({
            "nodes": [{"id": "first", "type": "count"}, {"id": "second", "type": "flaky"}],
            "edges": [{"source": "first", "target": "second"}]
        });
        let added = queue.add(job("e-retry", graph)).await.unwrap();

        runtime.poll_queue().await.unwrap();
        wait_for_state(&queue, &added.id, JobState::Failed).await;
        while runtime.in_flight() > 0 {
            tokio::task::yield_now().await;
        }

        queue.retry(&added.id).await.unwrap();
        assert_eq!(runtime.poll_queue().await.unwrap(), 1);
        let done = wait_for_state(&queue, &added.id, JobState::Completed).await;
        assert_eq!(done.return_value.unwrap()["completedNodes"], json!(["first", "second"]));
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_job_command_for_completed_execution() {
        let (queue, _, runtime) = runtime(1);
        let added = queue.add(job("e-done", good_graph())).await.unwrap();
        runtime.poll_queue().await.unwrap();
        let done = wait_for_state(&queue, &added.id, JobState::Completed).await;

        let request = ExecuteRequest::from_job(&done).into_execution_request().unwrap();
        let err = runtime.job_command(request).await.unwrap_err();
        assert!(err.to_string().contains("already completed"));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_stopping_executions() {
        let gate = Arc::new(Notify::new());
        let mut nodes = NodeRegistry::with_builtins();
        nodes.register("gate", Arc::new(Gate(gate.clone())));
        let (queue, _, runtime) = runtime_with_nodes(1, nodes);
        let added = queue.add(job("e-drain", gated_pair())).await.unwrap();
        runtime.poll_queue().await.unwrap();

        let open = async {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            gate.notify_one();
        };
        let (shutdown, _) = tokio::join!(runtime.shutdown(), open);
        shutdown.unwrap();

        assert_eq!(runtime.in_flight(), 0);
        assert_eq!(queue.get(&added.id).await.unwrap().unwrap().state, JobState::Delayed);
    }

    #[tokio::test]
    async fn test_drain_times_out() {
        let gate = Arc::new(Notify::new());
        let mut nodes = NodeRegistry::with_builtins();
        nodes.register("gate", Arc::new(Gate(gate.clone())));
        let (queue, _, runtime) = runtime_with_nodes(1, nodes);
        queue.add(job("e-slow", gated_pair())).await.unwrap();
        runtime.poll_queue().await.unwrap();

        assert!(!runtime.drain(std::time::Duration::from_millis(30)).await);
        assert_eq!(runtime.in_flight(), 1);
        gate.notify_one();
        assert!(runtime.drain(std::time::Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_start_registers_and_shutdown_deregisters() {
        let (_, registry, runtime) = runtime(3);
        runtime.start().await.unwrap();

        let record = registry.get_worker("w-test").await.unwrap();
        assert_eq!(record.capacity, 3);
        assert!(registry.is_heartbeating());

        runtime.shutdown().await.unwrap();
        assert!(registry.get_worker("w-test").await.is_err());
        assert!(!registry.is_heartbeating());
    }
}
