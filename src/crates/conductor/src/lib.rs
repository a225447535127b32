//! Orchestration control center for a fleet of workflow workers
//!
//! This crate provides the pieces needed to run long, multi-step content
//! generation workflows across interchangeable worker processes:
//!
//! - [`registry`] - self-registering workers with heartbeat health tracking
//! - [`routing`] - worker selection under ten load-balancing strategies
//! - [`jobs`] - job queue lifecycle control, bulk operations and cron jobs
//! - [`deployment`] - worker creation, cloning and scaling over a process backend
//! - [`execution`] - the checkpointing workflow execution state machine
//! - [`metrics`] - fleet capacity sampling and scaling recommendations
//! - [`dispatch`] - pushing queued jobs to workers over HTTP
//! - [`worker`] - the runtime hosted by each `workflow-worker` process
//! - [`api`] - axum routers for the control center and worker surfaces

pub mod api;
pub mod config;
pub mod db;
pub mod deployment;
pub mod dispatch;
pub mod execution;
pub mod jobs;
pub mod metrics;
pub mod registry;
pub mod routing;
pub mod worker;

use thiserror::Error;

/// Errors that can occur across the control center
#[derive(Debug, Error)]
pub enum ConductorError {
    /// Request or configuration rejected before any work started
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No healthy worker can take the job
    #[error("No workers available: {0}")]
    NoWorkers(String),

    /// Worker is already running its maximum number of executions
    #[error("Worker at capacity ({active}/{max} executions)")]
    Capacity { active: usize, max: usize },

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Worker not found
    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    /// Execution not found
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Invalid state transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Requested worker port already taken
    #[error("Port {0} is already used by another worker")]
    PortConflict(u16),

    /// Process backend failure
    #[error("Deployment error: {0}")]
    Deployment(String),

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(String),

    /// A workflow node failed
    #[error("Node {node_id} failed: {message}")]
    Node { node_id: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// General error
    #[error("Conductor error: {0}")]
    General(String),
}

impl ConductorError {
    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConductorError::Store(_) | ConductorError::NoWorkers(_) | ConductorError::Capacity { .. }
        )
    }

    /// Whether the error means the addressed entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ConductorError::JobNotFound(_)
                | ConductorError::WorkerNotFound(_)
                | ConductorError::ExecutionNotFound(_)
        )
    }
}

impl From<sqlx::Error> for ConductorError {
    fn from(err: sqlx::Error) -> Self {
        ConductorError::Store(db::DatabaseError::from(err).to_string())
    }
}

impl From<db::DatabaseError> for ConductorError {
    fn from(err: db::DatabaseError) -> Self {
        ConductorError::Store(err.to_string())
    }
}

impl From<tooling::ToolingError> for ConductorError {
    fn from(err: tooling::ToolingError) -> Self {
        ConductorError::Config(err.to_string())
    }
}

/// Result type for conductor operations
pub type Result<T> = std::result::Result<T, ConductorError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_display() {
        let err = ConductorError::Capacity { active: 5, max: 5 };
        assert_eq!(err.to_string(), "Worker at capacity (5/5 executions)");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ConductorError::Store("locked".into()).is_transient());
        assert!(ConductorError::NoWorkers("empty".into()).is_transient());
        assert!(!ConductorError::Validation("bad".into()).is_transient());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ConductorError::JobNotFound("j1".into()).is_not_found());
        assert!(!ConductorError::PortConflict(3001).is_not_found());
    }

    #[test]
    fn test_sqlx_error_becomes_store_error() {
        let err: ConductorError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ConductorError::Store(_)));
    }
}
