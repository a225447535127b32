//! Registry record repository

use crate::db::connection::DatabasePool;
use crate::db::models::RegistryRecord;

/// Repository for expiring registry records
///
/// Expired rows stay in the table until [`purge_expired`](Self::purge_expired)
/// runs, but every read filters them out.
pub struct RegistryRecordRepository;

impl RegistryRecordRepository {
    /// Insert or replace a record
    pub async fn upsert(
        pool: &DatabasePool,
        key: &str,
        value: &str,
        expires_at: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO registry_records (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Get a live record by key
    pub async fn get(
        pool: &DatabasePool,
        key: &str,
        now: i64,
    ) -> Result<Option<RegistryRecord>, sqlx::Error> {
        sqlx::query_as::<_, RegistryRecord>(
            "SELECT * FROM registry_records WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    /// List live records whose key starts with `prefix`
    pub async fn list_prefix(
        pool: &DatabasePool,
        prefix: &str,
        now: i64,
    ) -> Result<Vec<RegistryRecord>, sqlx::Error> {
        sqlx::query_as::<_, RegistryRecord>(
            "SELECT * FROM registry_records WHERE substr(key, 1, length(?)) = ? AND expires_at > ? ORDER BY key",
        )
        .bind(prefix)
        .bind(prefix)
        .bind(now)
        .fetch_all(pool)
        .await
    }

    /// Delete a record, returning whether it existed
    pub async fn delete(pool: &DatabasePool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM registry_records WHERE key = ?")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every expired record
    pub async fn purge_expired(pool: &DatabasePool, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM registry_records WHERE expires_at <= ?")
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
