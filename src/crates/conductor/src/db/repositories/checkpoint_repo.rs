//! Checkpoint repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::CheckpointRow;

/// Checkpoint repository for managing per-node execution checkpoints
pub struct CheckpointRepository;

impl CheckpointRepository {
    /// Append a checkpoint
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &DatabasePool,
        execution_id: &str,
        node_id: &str,
        node_index: i64,
        node_outputs: &str,
        completed_nodes: &str,
        failed_at_node: Option<&str>,
        error: Option<&str>,
        resumable: bool,
        created_at: &str,
    ) -> Result<CheckpointRow, sqlx::Error> {
        sqlx::query_as::<_, CheckpointRow>(
            "INSERT INTO checkpoints (execution_id, node_id, node_index, node_outputs, completed_nodes, failed_at_node, error, resumable, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(execution_id)
        .bind(node_id)
        .bind(node_index)
        .bind(node_outputs)
        .bind(completed_nodes)
        .bind(failed_at_node)
        .bind(error)
        .bind(resumable)
        .bind(created_at)
        .fetch_one(pool)
        .await
    }

    /// Get latest checkpoint for an execution
    pub async fn get_latest_for_execution(
        pool: &DatabasePool,
        execution_id: &str,
    ) -> Result<Option<CheckpointRow>, sqlx::Error> {
        sqlx::query_as::<_, CheckpointRow>(
            "SELECT * FROM checkpoints WHERE execution_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(execution_id)
        .fetch_optional(pool)
        .await
    }

    /// List checkpoints by execution, oldest first
    pub async fn list_by_execution(
        pool: &DatabasePool,
        execution_id: &str,
    ) -> Result<Vec<CheckpointRow>, sqlx::Error> {
        sqlx::query_as::<_, CheckpointRow>(
            "SELECT * FROM checkpoints WHERE execution_id = ? ORDER BY id ASC",
        )
        .bind(execution_id)
        .fetch_all(pool)
        .await
    }
}
