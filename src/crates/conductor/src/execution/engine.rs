//! Workflow Execution Engine
//!
//! Runs a workflow graph node by node in topological order. After every
//! completed node the engine writes a checkpoint and waits for the write to
//! succeed before moving on, so a crash costs at most the node that was in
//! flight. A failing node never propagates an error: the execution ends as
//! failed with a resumable failure checkpoint, and [`resume`] picks up at
//! the failed node without re-running completed ones.
//!
//! [`resume`]: WorkflowExecutionEngine::resume

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tooling::async_utils::retry::{with_retry_if, RetryPolicy};

use super::control::{Boundary, ControlState, ExecutionControl};
use super::graph::{WorkflowGraph, WorkflowNode};
use super::node::{NodeContext, NodeOutput, NodeRegistry};
use super::progress::{ProgressTracker, ProgressUpdate};
use super::state::{Checkpoint, ExecutionStatus, WorkflowExecutionState};
use super::store::{ExecutionStore, ExecutionTotals};
use crate::{ConductorError, Result};

/// Start a new execution
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub execution_id: String,
    pub job_id: Option<String>,
    pub user_id: Option<String>,
    pub workflow: WorkflowGraph,
    pub inputs: serde_json::Value,
}

/// Continue an execution from its latest checkpoint
#[derive(Debug, Clone)]
pub struct ResumeRequest {
    pub execution_id: String,
    pub workflow: WorkflowGraph,
    pub inputs: serde_json::Value,
    /// Guidance passed to the first node that runs, and only to it
    pub regeneration: Option<String>,
}

/// Outcome of one engine run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub node_outputs: BTreeMap<String, NodeOutput>,
    pub completed_nodes: Vec<String>,
    pub final_output: Option<NodeOutput>,
    pub failed_at_node: Option<String>,
    pub error: Option<String>,
    pub resumable: bool,
    pub totals: ExecutionTotals,
}

/// Live view of a running execution shared with its manager
#[derive(Clone, Default)]
pub struct ExecutionHandle {
    pub control: ExecutionControl,
    snapshot: Arc<Mutex<Option<WorkflowExecutionState>>>,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
}

impl ExecutionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver node progress events to `sender`
    pub fn with_progress(mut self, sender: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Latest published state, if the engine has started
    pub fn snapshot(&self) -> Option<WorkflowExecutionState> {
        self.snapshot.lock().clone()
    }

    fn publish(&self, state: &WorkflowExecutionState) {
        *self.snapshot.lock() = Some(state.clone());
    }
}

/// Runs workflow graphs with per-node checkpoints
pub struct WorkflowExecutionEngine {
    store: Arc<dyn ExecutionStore>,
    nodes: NodeRegistry,
    retry: RetryPolicy,
}

impl WorkflowExecutionEngine {
    /// Create an engine over `store` with the given node handlers
    pub fn new(store: Arc<dyn ExecutionStore>, nodes: NodeRegistry) -> Self {
        Self {
            store,
            nodes,
            retry: RetryPolicy::store_writes(),
        }
    }

    /// Retry policy for checkpoint and status writes
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Run a workflow from its first node
    pub async fn execute(&self, request: ExecutionRequest, handle: &ExecutionHandle) -> Result<ExecutionResult> {
        let order = self.plan(&request.workflow)?;
        let id = request.execution_id.clone();
        tracing::info!("Starting execution {} ({} nodes)", id, order.len());

        self.persist("create execution record", || {
            self.store
                .create_record(&id, request.job_id.as_deref(), request.user_id.as_deref())
        })
        .await?;

        let state = WorkflowExecutionState::new(&id, order.len());
        let tracker = self.tracker(&id, order.len(), handle);
        self.run(state, &order, 0, &request.inputs, None, handle, tracker)
            .await
    }

    /// Continue after a crash, stop or failure.
    ///
    /// Uses the latest checkpoint (or, without one, the outputs kept in the
    /// execution record) and restarts right after the last completed node.
    pub async fn resume(&self, request: ResumeRequest, handle: &ExecutionHandle) -> Result<ExecutionResult> {
        let order = self.plan(&request.workflow)?;
        let id = request.execution_id.clone();

        let record = self
            .store
            .get_record(&id)
            .await?
            .ok_or_else(|| ConductorError::ExecutionNotFound(id.clone()))?;
        if record.status == ExecutionStatus::Completed.as_str() {
            return Err(ConductorError::Validation(format!("Execution {} already completed", id)));
        }

        let (outputs, completed) = match self.store.latest_checkpoint(&id).await? {
            Some(checkpoint) => (checkpoint.node_outputs, checkpoint.completed_nodes),
            None => recorded_progress(record.data()),
        };

        let resume_index = match completed.last() {
            Some(last) => {
                order
                    .iter()
                    .position(|n| &n.id == last)
                    .ok_or_else(|| {
                        ConductorError::Validation(format!(
                            "Completed node {} is not part of the workflow",
                            last
                        ))
                    })?
                    + 1
            }
            None => 0,
        };

        let mut state = WorkflowExecutionState::new(&id, order.len());
        state.node_outputs = outputs;
        state.completed_nodes = completed;
        state.current_node_index = resume_index;

        let mut tracker = self.tracker(&id, order.len(), handle);
        tracker.restore(state.node_outputs.values(), state.completed_nodes.len());

        let regeneration = request
            .regeneration
            .filter(|g| !g.trim().is_empty())
            .and_then(|g| order.get(resume_index).map(|node| (node.id.clone(), g)));

        tracing::info!(
            "Resuming execution {} at node {}/{}",
            id,
            resume_index + 1,
            order.len()
        );
        self.run(state, &order, resume_index, &request.inputs, regeneration, handle, tracker)
            .await
    }

    /// Re-run the failed (or next) node with guidance, then continue.
    ///
    /// Only failed or stopped executions can be regenerated, and a failed
    /// one only if its failure was recorded as resumable.
    pub async fn regenerate(&self, request: ResumeRequest, handle: &ExecutionHandle) -> Result<ExecutionResult> {
        let id = &request.execution_id;
        let record = self
            .store
            .get_record(id)
            .await?
            .ok_or_else(|| ConductorError::ExecutionNotFound(id.clone()))?;

        let resumable = match record.status.parse::<ExecutionStatus>()? {
            ExecutionStatus::Stopped => true,
            ExecutionStatus::Failed => record
                .data()
                .and_then(|data| data.get("resumable").and_then(serde_json::Value::as_bool))
                .unwrap_or(false),
            _ => false,
        };
        if !resumable {
            return Err(ConductorError::Validation(format!(
                "Execution {} is {} and cannot be regenerated",
                id, record.status
            )));
        }
        if request.regeneration.as_deref().map_or(true, |g| g.trim().is_empty()) {
            return Err(ConductorError::Validation("Regeneration guidance is required".into()));
        }
        self.resume(request, handle).await
    }

    fn plan(&self, workflow: &WorkflowGraph) -> Result<Vec<WorkflowNode>> {
        let order = workflow.execution_order()?;
        if let Some(node) = order.iter().find(|n| self.nodes.get(&n.node_type).is_none()) {
            return Err(ConductorError::Validation(format!(
                "Node {} has unknown type '{}'",
                node.id, node.node_type
            )));
        }
        Ok(order)
    }

    fn tracker(&self, id: &str, total: usize, handle: &ExecutionHandle) -> ProgressTracker {
        let tracker = ProgressTracker::new(id, total);
        match &handle.progress {
            Some(sender) => tracker.with_sender(sender.clone()),
            None => tracker,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        mut state: WorkflowExecutionState,
        order: &[WorkflowNode],
        start: usize,
        inputs: &serde_json::Value,
        regeneration: Option<(String, String)>,
        handle: &ExecutionHandle,
        mut tracker: ProgressTracker,
    ) -> Result<ExecutionResult> {
        let id = state.execution_id.clone();
        let started = Instant::now();

        state.set_status(ExecutionStatus::Running);
        handle.publish(&state);
        self.persist("mark running", || self.store.update_status(&id, ExecutionStatus::Running))
            .await?;

        for (index, node) in order.iter().enumerate().skip(start) {
            if handle.control.state() == ControlState::Paused {
                state.set_status(ExecutionStatus::Paused);
                handle.publish(&state);
                self.persist("mark paused", || self.store.update_status(&id, ExecutionStatus::Paused))
                    .await?;
                tracing::info!("Execution {} paused before node {}", id, node.id);
            }

            if handle.control.wait_at_boundary().await == Boundary::Stop {
                state.set_status(ExecutionStatus::Stopped);
                handle.publish(&state);
                self.persist("mark stopped", || self.store.update_status(&id, ExecutionStatus::Stopped))
                    .await?;
                tracing::info!("Execution {} stopped before node {}", id, node.id);
                return Ok(result(&state, order, &tracker, started, None));
            }

            if state.status == ExecutionStatus::Paused {
                state.set_status(ExecutionStatus::Running);
                self.persist("mark running", || self.store.update_status(&id, ExecutionStatus::Running))
                    .await?;
            }
            state.current_node_index = index;
            handle.publish(&state);

            let handler = self.nodes.get(&node.node_type).ok_or_else(|| {
                ConductorError::Validation(format!("Unknown node type '{}'", node.node_type))
            })?;
            let ctx = NodeContext {
                execution_id: id.clone(),
                inputs: inputs.clone(),
                outputs: state.node_outputs.clone(),
                last_output: last_output(&state, order, index),
                regeneration: regeneration
                    .as_ref()
                    .filter(|(target, _)| *target == node.id)
                    .map(|(_, guidance)| guidance.clone()),
            };

            tracing::debug!("Executing node {} ({}) of {}", node.id, node.node_type, id);
            match handler.execute(node, &ctx).await {
                Ok(output) => {
                    let checkpoint = state.commit(&node.id, index, output.clone());
                    self.save_checkpoint(&checkpoint).await?;

                    tracker.node_completed(index, &node.id, node.display_name(), &output);
                    if let Err(e) = self
                        .persist("update progress", || self.store.update_progress(&id, tracker.live()))
                        .await
                    {
                        tracing::warn!("Continuing {} without progress for node {}: {}", id, node.id, e);
                    }
                    handle.publish(&state);
                }
                Err(e) => {
                    tracing::warn!("Node {} of execution {} failed: {}", node.id, id, e);
                    let checkpoint = state.record_failure(&node.id, index, &e.message);
                    state.set_status(ExecutionStatus::Failed);
                    tracker.node_failed(&node.id, node.display_name());
                    handle.publish(&state);

                    if let Some(checkpoint) = &checkpoint {
                        self.save_checkpoint(checkpoint).await?;
                    }
                    let outcome = result(&state, order, &tracker, started, Some((&node.id, &e.message)));
                    let payload = json!({
                        "error": e.message,
                        "failedAtNode": node.id,
                        "nodeOutputs": state.node_outputs,
                        "completedNodes": state.completed_nodes,
                        "resumable": true,
                    });
                    self.persist("record failure", || self.store.fail(&id, &payload, &outcome.totals))
                        .await?;
                    return Ok(outcome);
                }
            }
        }

        state.set_status(ExecutionStatus::Completed);
        handle.publish(&state);
        let outcome = result(&state, order, &tracker, started, None);
        let payload = json!({
            "result": outcome.final_output.as_ref().map(|o| o.content.clone()),
            "nodeOutputs": state.node_outputs,
            "completedNodes": state.completed_nodes,
        });
        self.persist("record completion", || self.store.complete(&id, &payload, &outcome.totals))
            .await?;
        tracing::info!(
            "Execution {} completed in {}",
            id,
            tooling::logging::format_duration(started.elapsed())
        );
        Ok(outcome)
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        tooling::logging::timed(
            "save_checkpoint",
            self.persist("save checkpoint", || self.store.save_checkpoint(checkpoint)),
        )
        .await
    }

    /// Run a store write, retrying transient failures with backoff
    async fn persist<F, Fut, T>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry_if(&self.retry, ConductorError::is_transient, op)
            .await
            .map_err(|e| {
                tracing::error!("Failed to {}: {}", what, e);
                e
            })
    }
}

/// Output of the nearest node before `index` that has one
fn last_output(state: &WorkflowExecutionState, order: &[WorkflowNode], index: usize) -> Option<NodeOutput> {
    order[..index]
        .iter()
        .rev()
        .find_map(|node| state.node_outputs.get(&node.id).cloned())
}

/// Outputs and completed nodes stored in a failure record
fn recorded_progress(data: Option<serde_json::Value>) -> (BTreeMap<String, NodeOutput>, Vec<String>) {
    let Some(data) = data else {
        return (BTreeMap::new(), Vec::new());
    };
    let outputs = data
        .get("nodeOutputs")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let completed = data
        .get("completedNodes")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    (outputs, completed)
}

fn result(
    state: &WorkflowExecutionState,
    order: &[WorkflowNode],
    tracker: &ProgressTracker,
    started: Instant,
    failure: Option<(&str, &str)>,
) -> ExecutionResult {
    let final_output = match state.status {
        ExecutionStatus::Completed => order
            .last()
            .and_then(|node| state.node_outputs.get(&node.id).cloned()),
        _ => None,
    };
    ExecutionResult {
        execution_id: state.execution_id.clone(),
        status: state.status,
        node_outputs: state.node_outputs.clone(),
        completed_nodes: state.completed_nodes.clone(),
        final_output,
        failed_at_node: failure.map(|(node, _)| node.to_string()),
        error: failure.map(|(_, message)| message.to_string()),
        resumable: matches!(state.status, ExecutionStatus::Failed | ExecutionStatus::Stopped),
        totals: ExecutionTotals {
            tokens_used: tracker.live().tokens_used,
            cost: tracker.live().cost,
            execution_time_ms: started.elapsed().as_millis() as u64,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::node::{NodeError, NodeHandler};
    use crate::execution::store::InMemoryExecutionStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then echoes the node id
    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl NodeHandler for Flaky {
        async fn execute(&self, node: &WorkflowNode, _ctx: &NodeContext) -> std::result::Result<NodeOutput, NodeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(NodeError::new("provider unavailable"));
            }
            Ok(NodeOutput::text(format!("{} done", node.id)))
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(4).with_initial_interval(0.001).with_jitter(false)
    }

    fn engine_with(store: Arc<InMemoryExecutionStore>, flaky: Arc<Flaky>) -> WorkflowExecutionEngine {
        let mut nodes = NodeRegistry::with_builtins();
        nodes.register("flaky", flaky);
        WorkflowExecutionEngine::new(store, nodes).with_retry_policy(fast_retry())
    }

    fn request(workflow: WorkflowGraph) -> ExecutionRequest {
        ExecutionRequest {
            execution_id: "exec-1".into(),
            job_id: Some("job-1".into()),
            user_id: Some("user-1".into()),
            workflow,
            inputs: json!({"topic": "tides"}),
        }
    }

    fn graph() -> WorkflowGraph {
        WorkflowGraph::chain(vec![
            WorkflowNode::new("brief", "input").with_config(json!({"field": "topic"})),
            WorkflowNode::new("draft", "flaky"),
            WorkflowNode::new("final", "template").with_config(json!({"template": "{{brief}}: {{draft}}"})),
        ])
    }

    #[tokio::test]
    async fn test_execute_completes_and_checkpoints_each_node() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let engine = engine_with(store.clone(), Arc::new(Flaky { calls: AtomicUsize::new(0), failures: 0 }));

        let result = engine.execute(request(graph()), &ExecutionHandle::new()).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.final_output.unwrap().as_text(), "tides: draft done");

        let checkpoints = store.list_checkpoints("exec-1").await.unwrap();
        assert_eq!(checkpoints.len(), 3);
        for (k, cp) in checkpoints.iter().enumerate() {
            assert_eq!(cp.node_index, k);
            assert_eq!(cp.completed_nodes.len(), k + 1);
        }
        let record = store.get_record("exec-1").await.unwrap().unwrap();
        assert_eq!(record.status, "completed");
        assert_eq!(record.progress, 100);
    }

    #[tokio::test]
    async fn test_node_failure_is_resumable_result() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let engine = engine_with(store.clone(), Arc::new(Flaky { calls: AtomicUsize::new(0), failures: 1 }));

        let result = engine.execute(request(graph()), &ExecutionHandle::new()).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.resumable);
        assert_eq!(result.failed_at_node.as_deref(), Some("draft"));
        assert_eq!(result.completed_nodes, vec!["brief"]);

        let latest = store.latest_checkpoint("exec-1").await.unwrap().unwrap();
        assert_eq!(latest.failed_at_node.as_deref(), Some("draft"));
        assert_eq!(store.get_record("exec-1").await.unwrap().unwrap().status, "failed");

        for cp in store.list_checkpoints("exec-1").await.unwrap() {
            assert_eq!(cp.completed_nodes.len(), cp.node_index + 1);
        }
    }

    #[tokio::test]
    async fn test_first_node_failure_can_be_regenerated() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let flaky = Arc::new(Flaky { calls: AtomicUsize::new(0), failures: 1 });
        let engine = engine_with(store.clone(), flaky.clone());
        let workflow = || {
            WorkflowGraph::chain(vec![
                WorkflowNode::new("draft", "flaky"),
                WorkflowNode::new("final", "template").with_config(json!({"template": "[{{draft}}]"})),
            ])
        };

        let failed = engine.execute(request(workflow()), &ExecutionHandle::new()).await.unwrap();
        assert_eq!(failed.failed_at_node.as_deref(), Some("draft"));
        assert!(store.list_checkpoints("exec-1").await.unwrap().is_empty());

        let regenerated = engine
            .regenerate(
                ResumeRequest {
                    execution_id: "exec-1".into(),
                    workflow: workflow(),
                    inputs: json!({}),
                    regeneration: Some("shorter".into()),
                },
                &ExecutionHandle::new(),
            )
            .await
            .unwrap();
        assert_eq!(regenerated.status, ExecutionStatus::Completed);
        assert_eq!(regenerated.final_output.unwrap().as_text(), "[draft done]");
    }

    /// Delegates to an in-memory store but refuses the first progress writes
    struct ProgressOutage {
        inner: InMemoryExecutionStore,
        refusals: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionStore for ProgressOutage {
        async fn create_record(
            &self,
            execution_id: &str,
            job_id: Option<&str>,
            user_id: Option<&str>,
        ) -> Result<crate::db::models::ExecutionRecord> {
            self.inner.create_record(execution_id, job_id, user_id).await
        }

        async fn get_record(&self, execution_id: &str) -> Result<Option<crate::db::models::ExecutionRecord>> {
            self.inner.get_record(execution_id).await
        }

        async fn update_status(&self, execution_id: &str, status: ExecutionStatus) -> Result<()> {
            self.inner.update_status(execution_id, status).await
        }

        async fn update_progress(&self, execution_id: &str, live: &crate::execution::LiveProgress) -> Result<()> {
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(ConductorError::Store("database is locked".into()));
            }
            self.inner.update_progress(execution_id, live).await
        }

        async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
            self.inner.save_checkpoint(checkpoint).await
        }

        async fn latest_checkpoint(&self, execution_id: &str) -> Result<Option<Checkpoint>> {
            self.inner.latest_checkpoint(execution_id).await
        }

        async fn list_checkpoints(&self, execution_id: &str) -> Result<Vec<Checkpoint>> {
            self.inner.list_checkpoints(execution_id).await
        }

        async fn complete(&self, execution_id: &str, result: &serde_json::Value, totals: &ExecutionTotals) -> Result<()> {
            self.inner.complete(execution_id, result, totals).await
        }

        async fn fail(&self, execution_id: &str, error: &serde_json::Value, totals: &ExecutionTotals) -> Result<()> {
            self.inner.fail(execution_id, error, totals).await
        }
    }

    #[tokio::test]
    async fn test_progress_writes_are_retried() {
        let store = Arc::new(ProgressOutage {
            inner: InMemoryExecutionStore::new(),
            refusals: AtomicUsize::new(2),
        });
        let engine = WorkflowExecutionEngine::new(store.clone(), NodeRegistry::with_builtins())
            .with_retry_policy(fast_retry());
        let workflow = WorkflowGraph::chain(vec![WorkflowNode::new("brief", "input")]);

        engine.execute(request(workflow), &ExecutionHandle::new()).await.unwrap();
        assert_eq!(store.refusals.load(Ordering::SeqCst), 0);
        let record = store.get_record("exec-1").await.unwrap().unwrap();
        assert_eq!(record.current_node.as_deref(), Some("brief"));
    }

    #[tokio::test]
    async fn test_transient_store_failures_are_retried() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let engine = engine_with(store.clone(), Arc::new(Flaky { calls: AtomicUsize::new(0), failures: 0 }));

        let workflow = WorkflowGraph::chain(vec![WorkflowNode::new("brief", "input")]);
        store.fail_next_writes(2);
        let result = engine.execute(request(workflow), &ExecutionHandle::new()).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(store.list_checkpoints("exec-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_store_error() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let engine = engine_with(store.clone(), Arc::new(Flaky { calls: AtomicUsize::new(0), failures: 0 }));

        store.fail_next_writes(10);
        let err = engine.execute(request(graph()), &ExecutionHandle::new()).await.unwrap_err();
        assert!(matches!(err, ConductorError::Store(_)));
    }

    #[tokio::test]
    async fn test_resume_skips_completed_nodes() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let flaky = Arc::new(Flaky { calls: AtomicUsize::new(0), failures: 1 });
        let engine = engine_with(store.clone(), flaky.clone());
        engine.execute(request(graph()), &ExecutionHandle::new()).await.unwrap();

        let resumed = engine
            .resume(
                ResumeRequest {
                    execution_id: "exec-1".into(),
                    workflow: graph(),
                    inputs: json!({"topic": "tides"}),
                    regeneration: None,
                },
                &ExecutionHandle::new(),
            )
            .await
            .unwrap();
        assert_eq!(resumed.status, ExecutionStatus::Completed);
        assert_eq!(resumed.completed_nodes, vec!["brief", "draft", "final"]);
        // one failed call plus one successful retry of the failed node
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_before_first_node() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let engine = engine_with(store.clone(), Arc::new(Flaky { calls: AtomicUsize::new(0), failures: 0 }));
        let handle = ExecutionHandle::new();
        handle.control.stop();

        let result = engine.execute(request(graph()), &handle).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Stopped);
        assert!(result.completed_nodes.is_empty());
        assert_eq!(store.get_record("exec-1").await.unwrap().unwrap().status, "stopped");
    }

    #[tokio::test]
    async fn test_unknown_node_type_rejected_before_start() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let engine = WorkflowExecutionEngine::new(store.clone(), NodeRegistry::with_builtins());
        let workflow = WorkflowGraph::chain(vec![WorkflowNode::new("img", "image")]);

        let err = engine.execute(request(workflow), &ExecutionHandle::new()).await.unwrap_err();
        assert!(matches!(err, ConductorError::Validation(_)));
        assert!(store.get_record("exec-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_regenerate_requires_failed_or_stopped() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let engine = engine_with(store.clone(), Arc::new(Flaky { calls: AtomicUsize::new(0), failures: 0 }));
        engine.execute(request(graph()), &ExecutionHandle::new()).await.unwrap();

        let err = engine
            .regenerate(
                ResumeRequest {
                    execution_id: "exec-1".into(),
                    workflow: graph(),
                    inputs: json!({"topic": "tides"}),
                    regeneration: Some("more detail".into()),
                },
                &ExecutionHandle::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::Validation(_)));
    }
}
