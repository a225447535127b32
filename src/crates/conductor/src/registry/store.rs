//! Expiring record stores backing the worker registry
//!
//! The registry needs five operations from its store: write a value with a
//! time-to-live, read one key, list a key prefix, delete, and purge what
//! expired. Values
//! are JSON text; the registry validates them into typed [`Worker`]s at the
//! boundary.
//!
//! Two implementations are provided:
//!
//! - [`InMemoryRecordStore`] - a `DashMap` with per-key deadlines, for a
//!   single process and for tests
//! - [`SqliteRecordStore`] - the `registry_records` table, shared by every
//!   worker and the control center through one database file
//!
//! [`Worker`]: super::Worker

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::db::repositories::RegistryRecordRepository;
use crate::db::DatabaseConnection;
use crate::Result;

/// A key/value store whose entries expire
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value and expiry
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Read a live value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// List live `(key, value)` pairs whose key starts with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>>;

    /// Delete a key, returning whether it was present
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}

/// In-process record store
///
/// Expired keys are invisible to reads and purged when touched.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: DashMap<String, (String, Instant)>,
}

impl InMemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries including expired ones not yet purged
    pub fn raw_len(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.records
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.records.get(key) {
            if entry.1 > now {
                return Ok(Some(entry.0.clone()));
            }
        }
        self.records
            .remove_if(key, |_, (_, deadline)| *deadline <= now);
        Ok(None)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let now = Instant::now();
        self.records.retain(|_, (_, deadline)| *deadline > now);

        let mut entries: Vec<(String, String)> = self
            .records
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().0.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.records.remove(key).is_some())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, (_, deadline)| *deadline > now);
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}

/// Record store on the shared SQLite database
#[derive(Clone)]
pub struct SqliteRecordStore {
    db: DatabaseConnection,
}

impl SqliteRecordStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let expires_at = Utc::now().timestamp_millis() + ttl.as_millis() as i64;
        RegistryRecordRepository::upsert(self.db.pool(), key, &value, expires_at).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let record =
            RegistryRecordRepository::get(self.db.pool(), key, Utc::now().timestamp_millis())
                .await?;
        Ok(record.map(|r| r.value))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let records = RegistryRecordRepository::list_prefix(
            self.db.pool(),
            prefix,
            Utc::now().timestamp_millis(),
        )
        .await?;
        Ok(records.into_iter().map(|r| (r.key, r.value)).collect())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(RegistryRecordRepository::delete(self.db.pool(), key).await?)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let removed =
            RegistryRecordRepository::purge_expired(self.db.pool(), Utc::now().timestamp_millis())
                .await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_expiry() {
        let store = InMemoryRecordStore::new();
        store
            .put("workers:w1", "{}".to_string(), Duration::from_secs(120))
            .await
            .unwrap();
        assert!(store.get("workers:w1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(store.get("workers:w1").await.unwrap().is_none());
        assert_eq!(store.raw_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_list_prefix_skips_expired() {
        let store = InMemoryRecordStore::new();
        store.put("workers:a", "1".into(), Duration::from_secs(10)).await.unwrap();
        store.put("workers:b", "2".into(), Duration::from_secs(100)).await.unwrap();
        store.put("other:c", "3".into(), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        let listed = store.list("workers:").await.unwrap();
        assert_eq!(listed, vec![("workers:b".to_string(), "2".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_memory_purge_counts_expired() {
        let store = InMemoryRecordStore::new();
        store.put("workers:a", "1".into(), Duration::from_secs(10)).await.unwrap();
        store.put("workers:b", "2".into(), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.raw_len(), 1);
    }

    #[tokio::test]
    async fn test_put_refreshes_expiry() {
        let store = InMemoryRecordStore::new();
        store.put("k", "old".into(), Duration::from_millis(1)).await.unwrap();
        store.put("k", "new".into(), Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let db = DatabaseConnection::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        let store = SqliteRecordStore::new(db);

        store.put("workers:w1", "{\"id\":\"w1\"}".into(), Duration::from_secs(60)).await.unwrap();
        store.put("workers:gone", "{}".into(), Duration::ZERO).await.unwrap();

        let listed = store.list("workers:").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "workers:w1");

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.delete("workers:w1").await.unwrap());
        assert!(store.get("workers:w1").await.unwrap().is_none());
    }
}
