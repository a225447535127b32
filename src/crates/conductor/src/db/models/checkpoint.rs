//! Checkpoint row model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::DatabaseError;
use crate::execution::Checkpoint;

/// A checkpoint as stored in the `checkpoints` table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckpointRow {
    /// Monotonic row id; the highest id per execution is the latest checkpoint
    pub id: i64,
    pub execution_id: String,
    pub node_id: String,
    pub node_index: i64,
    /// Node outputs so far (JSON object string)
    pub node_outputs: String,
    /// Completed node ids in order (JSON array string)
    pub completed_nodes: String,
    pub failed_at_node: Option<String>,
    pub error: Option<String>,
    pub resumable: bool,
    /// Creation timestamp (ISO8601 string)
    pub created_at: String,
}

impl TryFrom<CheckpointRow> for Checkpoint {
    type Error = DatabaseError;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        let timestamp = chrono::DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| DatabaseError::type_error(format!("Invalid checkpoint time: {}", e)))?
            .with_timezone(&chrono::Utc);

        Ok(Checkpoint {
            execution_id: row.execution_id,
            node_id: row.node_id,
            node_index: row.node_index.max(0) as usize,
            node_outputs: serde_json::from_str(&row.node_outputs)?,
            completed_nodes: serde_json::from_str(&row.completed_nodes)?,
            timestamp,
            failed_at_node: row.failed_at_node,
            error: row.error,
            resumable: row.resumable,
        })
    }
}
