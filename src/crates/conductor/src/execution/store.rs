//! Persistence of execution records and checkpoints

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::progress::LiveProgress;
use super::state::{Checkpoint, ExecutionStatus};
use crate::db::models::ExecutionRecord;
use crate::db::repositories::{CheckpointRepository, ExecutionRepository};
use crate::db::{DatabaseConnection, DatabaseError};
use crate::{ConductorError, Result};

/// Totals written with the final record
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTotals {
    pub tokens_used: u64,
    pub cost: f64,
    pub execution_time_ms: u64,
}

/// Where executions keep their record and checkpoints
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create a pending record. An id that already has a record is a
    /// validation error; continuing an execution goes through resume.
    async fn create_record(
        &self,
        execution_id: &str,
        job_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<ExecutionRecord>;

    async fn get_record(&self, execution_id: &str) -> Result<Option<ExecutionRecord>>;

    async fn update_status(&self, execution_id: &str, status: ExecutionStatus) -> Result<()>;

    /// Write only the live progress fields
    async fn update_progress(&self, execution_id: &str, live: &LiveProgress) -> Result<()>;

    /// Durably append a checkpoint
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Most recently saved checkpoint
    async fn latest_checkpoint(&self, execution_id: &str) -> Result<Option<Checkpoint>>;

    /// All checkpoints, oldest first
    async fn list_checkpoints(&self, execution_id: &str) -> Result<Vec<Checkpoint>>;

    /// Write the result payload and mark the record completed
    async fn complete(&self, execution_id: &str, result: &serde_json::Value, totals: &ExecutionTotals) -> Result<()>;

    /// Write the error payload and mark the record failed
    async fn fail(&self, execution_id: &str, error: &serde_json::Value, totals: &ExecutionTotals) -> Result<()>;
}

fn not_found(execution_id: &str) -> ConductorError {
    ConductorError::ExecutionNotFound(execution_id.to_string())
}

fn duplicate(execution_id: &str) -> ConductorError {
    ConductorError::Validation(format!("Execution {} already exists", execution_id))
}

/// Execution store held in process memory
#[derive(Default)]
pub struct InMemoryExecutionStore {
    records: DashMap<String, ExecutionRecord>,
    checkpoints: DashMap<String, Vec<Checkpoint>>,
    failing_writes: AtomicUsize,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with a store error
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<()> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ConductorError::Store("injected write failure".into()));
        }
        Ok(())
    }

    fn finish(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        data: &serde_json::Value,
        totals: &ExecutionTotals,
    ) -> Result<()> {
        self.check_write()?;
        let mut record = self.records.get_mut(execution_id).ok_or_else(|| not_found(execution_id))?;
        let now = Utc::now().to_rfc3339();
        record.status = status.to_string();
        record.execution_data = Some(data.to_string());
        record.tokens_used = totals.tokens_used as i64;
        record.cost_estimate = totals.cost;
        record.execution_time_ms = totals.execution_time_ms as i64;
        if status == ExecutionStatus::Completed {
            record.progress = 100;
        }
        record.updated_at = now.clone();
        record.completed_at = Some(now);
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create_record(
        &self,
        execution_id: &str,
        job_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<ExecutionRecord> {
        self.check_write()?;
        match self.records.entry(execution_id.to_string()) {
            Entry::Occupied(_) => Err(duplicate(execution_id)),
            Entry::Vacant(slot) => {
                let record = ExecutionRecord::new(
                    execution_id.to_string(),
                    job_id.map(String::from),
                    user_id.map(String::from),
                );
                Ok(slot.insert(record).clone())
            }
        }
    }

    async fn get_record(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self.records.get(execution_id).map(|r| r.clone()))
    }

    async fn update_status(&self, execution_id: &str, status: ExecutionStatus) -> Result<()> {
        self.check_write()?;
        let mut record = self.records.get_mut(execution_id).ok_or_else(|| not_found(execution_id))?;
        record.status = status.to_string();
        record.updated_at = Utc::now().to_rfc3339();
        Ok(())
    }

    async fn update_progress(&self, execution_id: &str, live: &LiveProgress) -> Result<()> {
        self.check_write()?;
        let mut record = self.records.get_mut(execution_id).ok_or_else(|| not_found(execution_id))?;
        record.progress = i64::from(live.progress);
        record.current_node = live.current_node.clone();
        record.live_preview = live.preview.clone();
        record.tokens_used = live.tokens_used as i64;
        record.cost_estimate = live.cost;
        record.updated_at = Utc::now().to_rfc3339();
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.check_write()?;
        self.checkpoints
            .entry(checkpoint.execution_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn latest_checkpoint(&self, execution_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .get(execution_id)
            .and_then(|list| list.last().cloned()))
    }

    async fn list_checkpoints(&self, execution_id: &str) -> Result<Vec<Checkpoint>> {
        Ok(self
            .checkpoints
            .get(execution_id)
            .map(|list| list.clone())
            .unwrap_or_default())
    }

    async fn complete(&self, execution_id: &str, result: &serde_json::Value, totals: &ExecutionTotals) -> Result<()> {
        self.finish(execution_id, ExecutionStatus::Completed, result, totals)
    }

    async fn fail(&self, execution_id: &str, error: &serde_json::Value, totals: &ExecutionTotals) -> Result<()> {
        self.finish(execution_id, ExecutionStatus::Failed, error, totals)
    }
}

/// Execution store on the shared SQLite database
#[derive(Clone)]
pub struct SqliteExecutionStore {
    db: DatabaseConnection,
}

impl SqliteExecutionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn finish(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        data: &serde_json::Value,
        totals: &ExecutionTotals,
    ) -> Result<()> {
        let updated = ExecutionRepository::finish(
            self.db.pool(),
            execution_id,
            status.as_str(),
            &data.to_string(),
            totals.tokens_used as i64,
            totals.cost,
            totals.execution_time_ms as i64,
        )
        .await?;
        if updated == 0 {
            return Err(not_found(execution_id));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn create_record(
        &self,
        execution_id: &str,
        job_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<ExecutionRecord> {
        ExecutionRepository::create(self.db.pool(), execution_id, job_id, user_id)
            .await
            .map_err(|e| match DatabaseError::from(e) {
                err if err.is_constraint_violation() => duplicate(execution_id),
                err => err.into(),
            })
    }

    async fn get_record(&self, execution_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(ExecutionRepository::get_by_id(self.db.pool(), execution_id).await?)
    }

    async fn update_status(&self, execution_id: &str, status: ExecutionStatus) -> Result<()> {
        let updated = ExecutionRepository::update_status(self.db.pool(), execution_id, status.as_str()).await?;
        if updated == 0 {
            return Err(not_found(execution_id));
        }
        Ok(())
    }

    async fn update_progress(&self, execution_id: &str, live: &LiveProgress) -> Result<()> {
        let updated = ExecutionRepository::update_progress(
            self.db.pool(),
            execution_id,
            i64::from(live.progress),
            live.current_node.as_deref(),
            live.preview.as_deref(),
            live.tokens_used as i64,
            live.cost,
        )
        .await?;
        if updated == 0 {
            return Err(not_found(execution_id));
        }
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        CheckpointRepository::create(
            self.db.pool(),
            &checkpoint.execution_id,
            &checkpoint.node_id,
            checkpoint.node_index as i64,
            &serde_json::to_string(&checkpoint.node_outputs)?,
            &serde_json::to_string(&checkpoint.completed_nodes)?,
            checkpoint.failed_at_node.as_deref(),
            checkpoint.error.as_deref(),
            checkpoint.resumable,
            &checkpoint.timestamp.to_rfc3339(),
        )
        .await?;
        Ok(())
    }

    async fn latest_checkpoint(&self, execution_id: &str) -> Result<Option<Checkpoint>> {
        match CheckpointRepository::get_latest_for_execution(self.db.pool(), execution_id).await? {
            Some(row) => Ok(Some(Checkpoint::try_from(row)?)),
            None => Ok(None),
        }
    }

    async fn list_checkpoints(&self, execution_id: &str) -> Result<Vec<Checkpoint>> {
        CheckpointRepository::list_by_execution(self.db.pool(), execution_id)
            .await?
            .into_iter()
            .map(|row| Checkpoint::try_from(row).map_err(ConductorError::from))
            .collect()
    }

    async fn complete(&self, execution_id: &str, result: &serde_json::Value, totals: &ExecutionTotals) -> Result<()> {
        self.finish(execution_id, ExecutionStatus::Completed, result, totals).await
    }

    async fn fail(&self, execution_id: &str, error: &serde_json::Value, totals: &ExecutionTotals) -> Result<()> {
        self.finish(execution_id, ExecutionStatus::Failed, error, totals).await
    }
}
