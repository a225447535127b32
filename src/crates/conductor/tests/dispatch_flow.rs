use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use conductor::api::worker_router;
use conductor::config::WorkerConfig;
use conductor::dispatch::{DispatchConfig, Dispatcher, WorkerClient};
use conductor::execution::{
    ExecutionManager, InMemoryExecutionStore, NodeContext, NodeError, NodeHandler, NodeOutput, NodeRegistry,
    WorkflowExecutionEngine, WorkflowNode,
};
use conductor::jobs::{job_types, InMemoryJobQueue, JobManager, JobPayload, JobPriority, JobQueue, JobState, JobsConfig};
use conductor::registry::{InMemoryRecordStore, RegistryConfig, Worker, WorkerRegistry, WorkerType};
use conductor::routing::{RoutingConfig, RoutingEngine};
use conductor::worker::WorkerRuntime;

/// Waits for a notification before producing output
struct Gate(Arc<Notify>);

#[async_trait]
impl NodeHandler for Gate {
    async fn execute(&self, _node: &WorkflowNode, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        self.0.notified().await;
        Ok(NodeOutput::text("opened"))
    }
}

/// Serve a worker on an ephemeral port that settles jobs in `queue`
async fn spawn_worker(queue: Arc<InMemoryJobQueue>, nodes: NodeRegistry) -> (String, Arc<WorkerRuntime>) {
    let engine = Arc::new(WorkflowExecutionEngine::new(Arc::new(InMemoryExecutionStore::new()), nodes));
    let runtime = Arc::new(WorkerRuntime::new(
        WorkerConfig {
            worker_id: "w-e2e".into(),
            queue_enabled: false,
            ..Default::default()
        },
        ExecutionManager::new(engine, 2),
        Arc::new(WorkerRegistry::new(
            Arc::new(InMemoryRecordStore::new()),
            RegistryConfig::default(),
        )),
        queue,
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let served = runtime.clone();
    tokio::spawn(async move {
        axum::serve(listener, worker_router(served)).await.unwrap();
    });
    (format!("http://{}", addr), runtime)
}

async fn registry_with(endpoint: String) -> Arc<WorkerRegistry> {
    let registry = Arc::new(WorkerRegistry::new(
        Arc::new(InMemoryRecordStore::new()),
        RegistryConfig::default(),
    ));
    registry
        .heartbeat(&Worker::new("w-e2e", WorkerType::Standard, endpoint))
        .await
        .unwrap();
    registry
}

fn payload(execution_id: &str) -> JobPayload {
    JobPayload {
        execution_id: execution_id.into(),
        workflow: Some(json!({
            "nodes": [
                {"id": "in", "type": "input", "config": {"field": "topic"}},
                {"id": "draft", "type": "template", "config": {"template": "Notes on {{in}}"}}
            ],
            "edges": [{"source": "in", "target": "draft"}]
        })),
        inputs: json!({"topic": "tides"}),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_dispatched_job_completes_on_worker() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let (endpoint, _) = spawn_worker(queue.clone(), NodeRegistry::with_builtins()).await;

    let registry = registry_with(endpoint).await;
    let routing = Arc::new(RoutingEngine::new(registry, RoutingConfig::default()));

    let jobs = JobManager::new(queue.clone(), JobsConfig::default());
    let job = jobs
        .submit_job(job_types::WORKFLOW, payload("x-e2e"), JobPriority::Normal, None)
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(queue.clone(), routing.clone(), DispatchConfig::default()).unwrap();
    let report = dispatcher.dispatch_once().await.unwrap();
    assert_eq!(report.dispatched, 1);
    assert!(!report.no_workers);

    let mut finished = None;
    for _ in 0..100 {
        let current = queue.get(&job.id).await.unwrap().unwrap();
        if current.state.is_finished() {
            finished = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let finished = finished.expect("job did not finish");
    assert_eq!(finished.state, JobState::Completed);
    assert_eq!(finished.worker_id.as_deref(), Some("w-e2e"));

    let metrics = routing.metrics();
    assert_eq!(metrics.total_selections, 1);

    // nothing left to send
    let report = dispatcher.dispatch_once().await.unwrap();
    assert_eq!(report.dispatched, 0);
}

#[tokio::test]
async fn test_empty_fleet_leaves_jobs_waiting() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let registry = Arc::new(WorkerRegistry::new(
        Arc::new(InMemoryRecordStore::new()),
        RegistryConfig::default(),
    ));
    let routing = Arc::new(RoutingEngine::new(registry, RoutingConfig::default()));
    let jobs = JobManager::new(queue.clone(), JobsConfig::default());
    let job = jobs
        .submit_job(job_types::WORKFLOW, payload("x-idle"), JobPriority::High, None)
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(queue.clone(), routing, DispatchConfig::default()).unwrap();
    let report = dispatcher.dispatch_once().await.unwrap();
    assert!(report.no_workers);
    assert_eq!(report.dispatched, 0);
    assert_eq!(queue.get(&job.id).await.unwrap().unwrap().state, JobState::Waiting);
}

#[tokio::test]
async fn test_cancelling_active_job_stops_its_execution() {
    let queue = Arc::new(InMemoryJobQueue::new());
    let gate = Arc::new(Notify::new());
    let mut nodes = NodeRegistry::with_builtins();
    nodes.register("gate", Arc::new(Gate(gate.clone())));
    let (endpoint, worker) = spawn_worker(queue.clone(), nodes).await;

    let registry = registry_with(endpoint).await;
    let routing = Arc::new(RoutingEngine::new(registry.clone(), RoutingConfig::default()));
    let jobs = JobManager::new(queue.clone(), JobsConfig::default())
        .with_worker_control(registry, WorkerClient::new(Duration::from_secs(5)).unwrap());
    let gated = JobPayload {
        execution_id: "x-cancel".into(),
        workflow: Some(json!({
            "nodes": [
                {"id": "wait", "type": "gate"},
                {"id": "after", "type": "template", "config": {"template": "after {{wait}}"}}
            ],
            "edges": [{"source": "wait", "target": "after"}]
        })),
        ..Default::default()
    };
    let job = jobs
        .submit_job(job_types::WORKFLOW, gated, JobPriority::Normal, None)
        .await
        .unwrap();

    let dispatcher = Dispatcher::new(queue.clone(), routing, DispatchConfig::default()).unwrap();
    assert_eq!(dispatcher.dispatch_once().await.unwrap().dispatched, 1);

    assert!(jobs.cancel_job(&job.id).await.success);
    gate.notify_one();
    assert!(worker.drain(Duration::from_secs(5)).await);

    let record = worker
        .manager()
        .engine()
        .store()
        .get_record("x-cancel")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "stopped");

    let cancelled = queue.get(&job.id).await.unwrap().unwrap();
    assert_eq!(cancelled.state, JobState::Failed);
    assert_eq!(cancelled.failed_reason.as_deref(), Some("cancelled"));
}
