//! Execution state and checkpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::node::NodeOutput;
use crate::ConductorError;

/// Lifecycle status of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Stopped,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Stopped => "stopped",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    /// Whether the execution has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Stopped | ExecutionStatus::Completed | ExecutionStatus::Failed
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "paused" => Ok(ExecutionStatus::Paused),
            "stopped" => Ok(ExecutionStatus::Stopped),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(ConductorError::Validation(format!("Unknown execution status: {}", other))),
        }
    }
}

/// A node failure kept on the execution state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeErrorRecord {
    pub node_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot taken right after a node completes, or when the next one fails.
///
/// A checkpoint for node `k` means nodes `0..=k` completed; a failure
/// checkpoint has the same shape and additionally names the node that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub execution_id: String,
    pub node_id: String,
    pub node_index: usize,
    pub node_outputs: BTreeMap<String, NodeOutput>,
    pub completed_nodes: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub resumable: bool,
}

impl Checkpoint {
    pub fn is_failure(&self) -> bool {
        self.failed_at_node.is_some()
    }
}

/// In-memory state of one execution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionState {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// Outputs of completed nodes only
    pub node_outputs: BTreeMap<String, NodeOutput>,
    /// Index of the next node to run
    pub current_node_index: usize,
    pub total_nodes: usize,
    pub completed_nodes: Vec<String>,
    pub errors: Vec<NodeErrorRecord>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecutionState {
    pub fn new(execution_id: impl Into<String>, total_nodes: usize) -> Self {
        let now = Utc::now();
        Self {
            execution_id: execution_id.into(),
            status: ExecutionStatus::Pending,
            node_outputs: BTreeMap::new(),
            current_node_index: 0,
            total_nodes,
            completed_nodes: Vec::new(),
            errors: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Record a completed node and build its checkpoint
    pub fn commit(&mut self, node_id: &str, node_index: usize, output: NodeOutput) -> Checkpoint {
        self.node_outputs.insert(node_id.to_string(), output);
        self.completed_nodes.push(node_id.to_string());
        self.current_node_index = node_index + 1;
        self.updated_at = Utc::now();

        Checkpoint {
            execution_id: self.execution_id.clone(),
            node_id: node_id.to_string(),
            node_index,
            node_outputs: self.node_outputs.clone(),
            completed_nodes: self.completed_nodes.clone(),
            timestamp: self.updated_at,
            failed_at_node: None,
            error: None,
            resumable: false,
        }
    }

    /// Record a node failure.
    ///
    /// The returned failure checkpoint is anchored at the last completed
    /// node, so it keeps the same shape as the success checkpoint before it
    /// and only adds the failed node, the error and the resumable flag.
    /// Nothing is returned when the first node fails.
    pub fn record_failure(&mut self, node_id: &str, node_index: usize, message: &str) -> Option<Checkpoint> {
        let now = Utc::now();
        self.errors.push(NodeErrorRecord {
            node_id: node_id.to_string(),
            message: message.to_string(),
            timestamp: now,
        });
        self.current_node_index = node_index;
        self.updated_at = now;

        let last = self.completed_nodes.last()?.clone();
        Some(Checkpoint {
            execution_id: self.execution_id.clone(),
            node_id: last,
            node_index: self.completed_nodes.len() - 1,
            node_outputs: self.node_outputs.clone(),
            completed_nodes: self.completed_nodes.clone(),
            timestamp: now,
            failed_at_node: Some(node_id.to_string()),
            error: Some(message.to_string()),
            resumable: true,
        })
    }

    /// Progress as a percentage of completed nodes
    pub fn progress_percent(&self) -> u8 {
        if self.total_nodes == 0 {
            return 100;
        }
        ((self.completed_nodes.len() * 100) / self.total_nodes).min(100) as u8
    }
}
