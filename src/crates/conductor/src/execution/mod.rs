//! Workflow execution
//!
//! A workflow is a directed graph of nodes executed one at a time in
//! topological order. Every completed node is checkpointed before the next
//! one starts; pause and stop requests are honoured only between nodes.

pub mod control;
pub mod engine;
pub mod graph;
pub mod manager;
pub mod node;
pub mod progress;
pub mod state;
pub mod store;

pub use control::{Boundary, ControlState, ExecutionControl};
pub use engine::{ExecutionHandle, ExecutionRequest, ExecutionResult, ResumeRequest, WorkflowExecutionEngine};
pub use graph::{WorkflowEdge, WorkflowGraph, WorkflowNode};
pub use manager::{ExecutionCommand, ExecutionManager, ExecutionStatusView, LoadSnapshot};
pub use node::{NodeContext, NodeError, NodeHandler, NodeOutput, NodeRegistry};
pub use progress::{LiveProgress, ProgressStatus, ProgressTracker, ProgressUpdate};
pub use state::{Checkpoint, ExecutionStatus, NodeErrorRecord, WorkflowExecutionState};
pub use store::{ExecutionStore, ExecutionTotals, InMemoryExecutionStore, SqliteExecutionStore};
