//! Execution record model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The persisted record of one workflow execution
///
/// Live fields (`progress`, `current_node`, `live_preview`, counters) are
/// rewritten as nodes finish. `execution_data` holds the full result or
/// error payload and is written once when the execution ends.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRecord {
    /// Execution identifier
    pub id: String,

    /// Queue job that started this execution, if any
    pub job_id: Option<String>,

    /// Owning user
    pub user_id: Option<String>,

    /// pending, running, paused, stopped, completed or failed
    pub status: String,

    /// Percentage of nodes completed (0-100)
    pub progress: i64,

    /// Node currently running or last completed
    pub current_node: Option<String>,

    /// Final result or error payload (JSON string)
    pub execution_data: Option<String>,

    /// Bounded preview of the latest node output
    pub live_preview: Option<String>,

    /// Tokens consumed so far
    pub tokens_used: i64,

    /// Estimated provider cost so far
    pub cost_estimate: f64,

    /// Wall-clock execution time in milliseconds
    pub execution_time_ms: i64,

    /// Creation timestamp (ISO8601 string)
    pub created_at: String,

    /// Last update timestamp (ISO8601 string)
    pub updated_at: String,

    /// Completion timestamp (ISO8601 string)
    pub completed_at: Option<String>,
}

impl ExecutionRecord {
    /// Create a fresh pending record
    pub fn new(id: String, job_id: Option<String>, user_id: Option<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            job_id,
            user_id,
            status: "pending".to_string(),
            progress: 0,
            current_node: None,
            execution_data: None,
            live_preview: None,
            tokens_used: 0,
            cost_estimate: 0.0,
            execution_time_ms: 0,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    /// Parse `execution_data` as JSON, if present and well formed
    pub fn data(&self) -> Option<serde_json::Value> {
        self.execution_data
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}
