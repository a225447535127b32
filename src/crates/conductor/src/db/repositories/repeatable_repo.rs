//! Repeatable job repository

use crate::db::connection::DatabasePool;
use crate::db::models::RepeatableJobRow;

/// Repository for cron-scheduled job templates
pub struct RepeatableJobRepository;

impl RepeatableJobRepository {
    /// Insert or replace a repeatable job
    pub async fn upsert(pool: &DatabasePool, row: &RepeatableJobRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO repeatable_jobs (key, job_type, payload, priority, cron, next_run, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, priority = excluded.priority, next_run = excluded.next_run",
        )
        .bind(&row.key)
        .bind(&row.job_type)
        .bind(&row.payload)
        .bind(row.priority)
        .bind(&row.cron)
        .bind(row.next_run)
        .bind(row.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// List all repeatable jobs ordered by next run
    pub async fn list(pool: &DatabasePool) -> Result<Vec<RepeatableJobRow>, sqlx::Error> {
        sqlx::query_as::<_, RepeatableJobRow>("SELECT * FROM repeatable_jobs ORDER BY next_run ASC")
            .fetch_all(pool)
            .await
    }

    /// Move a repeatable job's next run forward
    pub async fn update_next_run(
        pool: &DatabasePool,
        key: &str,
        next_run: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE repeatable_jobs SET next_run = ? WHERE key = ?")
            .bind(next_run)
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a repeatable job
    pub async fn delete(pool: &DatabasePool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM repeatable_jobs WHERE key = ?")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
