//! Job repository for the shared queue table

use crate::db::connection::DatabasePool;
use crate::db::models::JobRow;

/// Job repository
///
/// State changes go through [`save_if_state`](Self::save_if_state), which
/// only writes when the row is still in the state the caller read, so two
/// processes racing on one job cannot both win.
pub struct JobRepository;

impl JobRepository {
    /// Insert a new job
    pub async fn insert(pool: &DatabasePool, row: &JobRow) -> Result<JobRow, sqlx::Error> {
        sqlx::query_as::<_, JobRow>(
            "INSERT INTO jobs (id, job_type, payload, priority, state, attempts_made, delay_until, created_at,
                               processed_at, finished_at, failed_reason, return_value, worker_id, repeat_key)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&row.id)
        .bind(&row.job_type)
        .bind(&row.payload)
        .bind(row.priority)
        .bind(&row.state)
        .bind(row.attempts_made)
        .bind(row.delay_until)
        .bind(row.created_at)
        .bind(row.processed_at)
        .bind(row.finished_at)
        .bind(&row.failed_reason)
        .bind(&row.return_value)
        .bind(&row.worker_id)
        .bind(&row.repeat_key)
        .fetch_one(pool)
        .await
    }

    /// Get a job by ID
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<JobRow>, sqlx::Error> {
        sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs in a state, newest first
    pub async fn list_by_state(
        pool: &DatabasePool,
        state: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE state = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(state)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Count jobs in a state
    pub async fn count_by_state(pool: &DatabasePool, state: &str) -> Result<i64, sqlx::Error> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE state = ?")
            .bind(state)
            .fetch_one(pool)
            .await?;
        Ok(result.0)
    }

    /// Overwrite the mutable columns of a job if it is still in `expected_state`
    pub async fn save_if_state(
        pool: &DatabasePool,
        row: &JobRow,
        expected_state: &str,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        sqlx::query_as::<_, JobRow>(
            "UPDATE jobs
             SET priority = ?, state = ?, attempts_made = ?, delay_until = ?, processed_at = ?,
                 finished_at = ?, failed_reason = ?, return_value = ?, worker_id = ?
             WHERE id = ? AND state = ?
             RETURNING *",
        )
        .bind(row.priority)
        .bind(&row.state)
        .bind(row.attempts_made)
        .bind(row.delay_until)
        .bind(row.processed_at)
        .bind(row.finished_at)
        .bind(&row.failed_reason)
        .bind(&row.return_value)
        .bind(&row.worker_id)
        .bind(&row.id)
        .bind(expected_state)
        .fetch_optional(pool)
        .await
    }

    /// Atomically claim the next waiting job for a worker
    ///
    /// Highest priority first, then oldest. An empty `job_types` slice
    /// accepts any type.
    pub async fn take_next(
        pool: &DatabasePool,
        worker_id: &str,
        job_types: &[String],
        now: i64,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let type_filter = if job_types.is_empty() {
            String::new()
        } else {
            let placeholders = vec!["?"; job_types.len()].join(", ");
            format!("AND job_type IN ({})", placeholders)
        };

        let sql = format!(
            "UPDATE jobs
             SET state = 'active', processed_at = ?, worker_id = ?, attempts_made = attempts_made + 1
             WHERE state = 'waiting' AND id = (
                 SELECT id FROM jobs WHERE state = 'waiting' {}
                 ORDER BY priority ASC, created_at ASC LIMIT 1
             )
             RETURNING *",
            type_filter
        );

        let mut query = sqlx::query_as::<_, JobRow>(&sql).bind(now).bind(worker_id);
        for job_type in job_types {
            query = query.bind(job_type);
        }
        query.fetch_optional(pool).await
    }

    /// Move delayed jobs whose delay has passed back to waiting
    pub async fn promote_due_delayed(pool: &DatabasePool, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'waiting', delay_until = NULL
             WHERE state = 'delayed' AND delay_until IS NOT NULL AND delay_until <= ?",
        )
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete up to `limit` jobs in `state` that finished before `older_than`
    pub async fn clean(
        pool: &DatabasePool,
        state: &str,
        older_than: i64,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "DELETE FROM jobs WHERE id IN (
                 SELECT id FROM jobs WHERE state = ? AND COALESCE(finished_at, created_at) < ?
                 ORDER BY COALESCE(finished_at, created_at) ASC LIMIT ?
             )
             RETURNING id",
        )
        .bind(state)
        .bind(older_than)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Delete a job
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
