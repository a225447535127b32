//! Execution repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::ExecutionRecord;
use chrono::Utc;

/// Execution repository for managing execution records
pub struct ExecutionRepository;

impl ExecutionRepository {
    /// Create a pending execution record
    pub async fn create(
        pool: &DatabasePool,
        id: &str,
        job_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<ExecutionRecord, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query_as::<_, ExecutionRecord>(
            "INSERT INTO executions (id, job_id, user_id, status, created_at, updated_at)
             VALUES (?, ?, ?, 'pending', ?, ?)
             RETURNING *",
        )
        .bind(id)
        .bind(job_id)
        .bind(user_id)
        .bind(&now)
        .bind(&now)
        .fetch_one(pool)
        .await
    }

    /// Get an execution by ID
    pub async fn get_by_id(
        pool: &DatabasePool,
        id: &str,
    ) -> Result<Option<ExecutionRecord>, sqlx::Error> {
        sqlx::query_as::<_, ExecutionRecord>("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Update execution status
    pub async fn update_status(
        pool: &DatabasePool,
        id: &str,
        status: &str,
    ) -> Result<u64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("UPDATE executions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Update the live progress fields only
    pub async fn update_progress(
        pool: &DatabasePool,
        id: &str,
        progress: i64,
        current_node: Option<&str>,
        live_preview: Option<&str>,
        tokens_used: i64,
        cost_estimate: f64,
    ) -> Result<u64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE executions
             SET progress = ?, current_node = ?, live_preview = ?, tokens_used = ?, cost_estimate = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(progress)
        .bind(current_node)
        .bind(live_preview)
        .bind(tokens_used)
        .bind(cost_estimate)
        .bind(&now)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Write the final payload and terminal status
    pub async fn finish(
        pool: &DatabasePool,
        id: &str,
        status: &str,
        execution_data: &str,
        tokens_used: i64,
        cost_estimate: f64,
        execution_time_ms: i64,
    ) -> Result<u64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let progress_clause = if status == "completed" { "100" } else { "progress" };
        let sql = format!(
            "UPDATE executions
             SET status = ?, execution_data = ?, tokens_used = ?, cost_estimate = ?,
                 execution_time_ms = ?, progress = {}, updated_at = ?, completed_at = ?
             WHERE id = ?",
            progress_clause
        );
        let result = sqlx::query(&sql)
            .bind(status)
            .bind(execution_data)
            .bind(tokens_used)
            .bind(cost_estimate)
            .bind(execution_time_ms)
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete an execution record
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM executions WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
