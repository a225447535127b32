//! Per-worker execution admission and live tracking

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::control::ControlState;
use super::engine::{ExecutionHandle, ExecutionRequest, ExecutionResult, ResumeRequest, WorkflowExecutionEngine};
use super::progress::ProgressUpdate;
use super::state::ExecutionStatus;
use crate::{ConductorError, Result};

/// What to run for an admitted execution
#[derive(Debug, Clone)]
pub enum ExecutionCommand {
    Start(ExecutionRequest),
    Resume(ResumeRequest),
    Regenerate(ResumeRequest),
}

impl ExecutionCommand {
    pub fn execution_id(&self) -> &str {
        match self {
            ExecutionCommand::Start(req) => &req.execution_id,
            ExecutionCommand::Resume(req) | ExecutionCommand::Regenerate(req) => &req.execution_id,
        }
    }
}

/// Status of a live execution as reported by `/status/:id`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatusView {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub progress: u8,
    pub current_node_index: usize,
    pub total_nodes: usize,
    pub completed_nodes: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Load of this worker
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSnapshot {
    pub active: usize,
    pub max_concurrent: usize,
    pub available: usize,
    pub executions: Vec<String>,
}

struct LiveExecution {
    token: Uuid,
    handle: ExecutionHandle,
    admitted_at: DateTime<Utc>,
    /// Evicted as stuck; tracked until its task exits
    stopping: bool,
}

/// Runs at most `max_concurrent` executions and tracks them while live
#[derive(Clone)]
pub struct ExecutionManager {
    engine: Arc<WorkflowExecutionEngine>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    live: Arc<DashMap<String, LiveExecution>>,
    progress: Option<mpsc::Sender<ProgressUpdate>>,
}

impl ExecutionManager {
    pub fn new(engine: Arc<WorkflowExecutionEngine>, max_concurrent: usize) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            live: Arc::new(DashMap::new()),
            progress: None,
        }
    }

    /// Forward node progress of every execution to `sender`
    pub fn with_progress(mut self, sender: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn engine(&self) -> &Arc<WorkflowExecutionEngine> {
        &self.engine
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Admit and run an execution to its end.
    ///
    /// Fails with [`ConductorError::Capacity`] without waiting when all
    /// slots are taken.
    pub async fn run(&self, command: ExecutionCommand) -> Result<ExecutionResult> {
        let (permit, token, handle) = self.admit(command.execution_id())?;
        self.drive(command, token, handle, permit).await
    }

    /// Admit an execution and run it in the background
    pub fn spawn(&self, command: ExecutionCommand) -> Result<JoinHandle<Result<ExecutionResult>>> {
        let (permit, token, handle) = self.admit(command.execution_id())?;
        let manager = self.clone();
        Ok(tokio::spawn(async move {
            manager.drive(command, token, handle, permit).await
        }))
    }

    fn admit(&self, execution_id: &str) -> Result<(OwnedSemaphorePermit, Uuid, ExecutionHandle)> {
        if execution_id.trim().is_empty() {
            return Err(ConductorError::Validation("executionId is required".into()));
        }
        let permit = self.permits.clone().try_acquire_owned().map_err(|_| ConductorError::Capacity {
            active: self.active(),
            max: self.max_concurrent,
        })?;

        let token = Uuid::new_v4();
        let mut handle = ExecutionHandle::new();
        if let Some(sender) = &self.progress {
            handle = handle.with_progress(sender.clone());
        }

        match self.live.entry(execution_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let state = if entry.get().stopping { "still stopping" } else { "already running" };
                return Err(ConductorError::Validation(format!("Execution {} is {}", execution_id, state)));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(LiveExecution {
                    token,
                    handle: handle.clone(),
                    admitted_at: Utc::now(),
                    stopping: false,
                });
            }
        }
        tracing::debug!("Admitted execution {} ({}/{})", execution_id, self.active(), self.max_concurrent);
        Ok((permit, token, handle))
    }

    async fn drive(
        &self,
        command: ExecutionCommand,
        token: Uuid,
        handle: ExecutionHandle,
        _permit: OwnedSemaphorePermit,
    ) -> Result<ExecutionResult> {
        let execution_id = command.execution_id().to_string();
        let outcome = match command {
            ExecutionCommand::Start(req) => self.engine.execute(req, &handle).await,
            ExecutionCommand::Resume(req) => self.engine.resume(req, &handle).await,
            ExecutionCommand::Regenerate(req) => self.engine.regenerate(req, &handle).await,
        };
        self.live.remove_if(&execution_id, |_, live| live.token == token);

        match &outcome {
            Ok(result) => tracing::info!("Execution {} finished as {}", execution_id, result.status),
            Err(e) => tracing::error!("Execution {} aborted: {}", execution_id, e),
        }
        outcome
    }

    /// Live status, or `None` once the execution is no longer tracked
    pub fn status(&self, execution_id: &str) -> Option<ExecutionStatusView> {
        let live = self.live.get(execution_id)?;
        let view = match live.handle.snapshot() {
            Some(state) => {
                let status = match (state.status, live.handle.control.state()) {
                    (ExecutionStatus::Running, ControlState::Paused) => ExecutionStatus::Paused,
                    (status, _) => status,
                };
                ExecutionStatusView {
                    execution_id: state.execution_id.clone(),
                    status,
                    progress: state.progress_percent(),
                    current_node_index: state.current_node_index,
                    total_nodes: state.total_nodes,
                    completed_nodes: state.completed_nodes.clone(),
                    started_at: state.started_at,
                    updated_at: state.updated_at,
                }
            }
            None => ExecutionStatusView {
                execution_id: execution_id.to_string(),
                status: ExecutionStatus::Pending,
                progress: 0,
                current_node_index: 0,
                total_nodes: 0,
                completed_nodes: Vec::new(),
                started_at: live.admitted_at,
                updated_at: live.admitted_at,
            },
        };
        Some(view)
    }

    /// Request a stop at the next node boundary
    pub fn stop(&self, execution_id: &str) -> Result<()> {
        let live = self
            .live
            .get(execution_id)
            .ok_or_else(|| ConductorError::ExecutionNotFound(execution_id.to_string()))?;
        live.handle.control.stop();
        tracing::info!("Stop requested for execution {}", execution_id);
        Ok(())
    }

    /// Pause at the next node boundary. Returns whether the state changed.
    pub fn pause(&self, execution_id: &str) -> Result<bool> {
        let live = self
            .live
            .get(execution_id)
            .ok_or_else(|| ConductorError::ExecutionNotFound(execution_id.to_string()))?;
        Ok(live.handle.control.pause())
    }

    /// Let a paused execution continue. Returns whether the state changed.
    pub fn resume_paused(&self, execution_id: &str) -> Result<bool> {
        let live = self
            .live
            .get(execution_id)
            .ok_or_else(|| ConductorError::ExecutionNotFound(execution_id.to_string()))?;
        Ok(live.handle.control.resume())
    }

    pub fn active(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    pub fn load(&self) -> LoadSnapshot {
        let available = self.permits.available_permits();
        LoadSnapshot {
            active: self.max_concurrent - available,
            max_concurrent: self.max_concurrent,
            available,
            executions: self.live.iter().map(|e| e.key().clone()).collect(),
        }
    }

    /// Signal executions whose state has not changed for longer than
    /// `max_age` to stop. Returns the newly evicted ids.
    ///
    /// An evicted execution keeps its slot and its id until the task exits,
    /// so the same id cannot be admitted while the old run is in flight.
    pub fn cleanup_stuck(&self, max_age: Duration) -> Vec<String> {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Vec::new();
        };

        let stuck: Vec<String> = self
            .live
            .iter()
            .filter(|entry| !entry.stopping)
            .filter(|entry| {
                let last_update = entry
                    .handle
                    .snapshot()
                    .map_or(entry.admitted_at, |state| state.updated_at);
                last_update < cutoff
            })
            .map(|entry| entry.key().clone())
            .collect();

        for id in &stuck {
            if let Some(mut live) = self.live.get_mut(id) {
                live.stopping = true;
                live.handle.control.stop();
                tracing::warn!("Evicted stuck execution {}", id);
            }
        }
        stuck
    }

    /// Run [`cleanup_stuck`](Self::cleanup_stuck) periodically
    pub fn spawn_cleanup(&self, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let evicted = manager.cleanup_stuck(max_age);
                if !evicted.is_empty() {
                    tracing::info!("Stuck execution cleanup evicted {} executions", evicted.len());
                }
            }
        })
    }
}
