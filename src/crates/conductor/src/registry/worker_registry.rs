//! Registration, heartbeats, discovery and dead-worker sweeps

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::health::calculate_health;
use super::store::RecordStore;
use super::worker::{record_key, Worker, WorkerMetrics, WorkerStatus, WORKER_KEY_PREFIX};
use crate::{ConductorError, Result};

/// Supplies fresh metrics for each heartbeat
pub type MetricsSource = Arc<dyn Fn() -> WorkerMetrics + Send + Sync>;

/// Registry timing and health thresholds (`[registry]` in the control center config)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Lifetime of a worker record without a heartbeat
    pub record_ttl_secs: u64,
    /// Heartbeat period
    pub heartbeat_interval_secs: u64,
    /// Heartbeat age after which a worker counts as dead
    pub dead_threshold_secs: u64,
    /// Dead-worker sweep period
    pub sweep_interval_secs: u64,
    /// Minimum health (exclusive) for a worker to receive work
    pub healthy_threshold: u8,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            record_ttl_secs: 120,
            heartbeat_interval_secs: 30,
            dead_threshold_secs: 90,
            sweep_interval_secs: 60,
            healthy_threshold: 60,
        }
    }
}

impl RegistryConfig {
    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn dead_threshold(&self) -> Duration {
        Duration::from_secs(self.dead_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Worker registry over a shared [`RecordStore`]
///
/// Each worker process owns exactly one record and is the only writer of
/// it. The control center only reads records, plus deletes dead ones.
pub struct WorkerRegistry {
    store: Arc<dyn RecordStore>,
    config: RegistryConfig,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerRegistry {
    /// Create a registry over `store`
    pub fn new(store: Arc<dyn RecordStore>, config: RegistryConfig) -> Self {
        Self {
            store,
            config,
            heartbeat: Mutex::new(None),
        }
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register the calling worker and start its heartbeat.
    ///
    /// Calling this again rewrites the record but never starts a second
    /// heartbeat task. With a metrics source, each heartbeat pulls fresh
    /// metrics from it; without one the registered metrics are re-sent
    /// unchanged.
    pub async fn register_self(&self, worker: &Worker, metrics: Option<MetricsSource>) -> Result<()> {
        let registered = write_record(self.store.as_ref(), worker.clone(), &self.config).await?;
        tracing::info!(
            "Registered worker {} ({}) at {} with health {}",
            registered.id,
            registered.worker_type,
            registered.endpoint,
            registered.health
        );

        let mut heartbeat = self.heartbeat.lock();
        if heartbeat.is_none() {
            let store = self.store.clone();
            let config = self.config.clone();
            let worker = worker.clone();
            *heartbeat = Some(tokio::spawn(heartbeat_loop(store, config, worker, metrics)));
        }
        Ok(())
    }

    /// Refresh one worker record now
    pub async fn heartbeat(&self, worker: &Worker) -> Result<Worker> {
        write_record(self.store.as_ref(), worker.clone(), &self.config).await
    }

    /// Stop the heartbeat and delete the worker's record
    pub async fn deregister_self(&self, worker_id: &str) -> Result<bool> {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
        let removed = self.store.delete(&record_key(worker_id)).await?;
        tracing::info!("Deregistered worker {}", worker_id);
        Ok(removed)
    }

    /// Whether this registry instance is running a heartbeat task
    pub fn is_heartbeating(&self) -> bool {
        self.heartbeat
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Every worker with a live record. Malformed records are skipped.
    pub async fn get_all_workers(&self) -> Result<Vec<Worker>> {
        let records = self.store.list(WORKER_KEY_PREFIX).await?;
        let mut workers = Vec::with_capacity(records.len());
        for (key, value) in records {
            match serde_json::from_str::<Worker>(&value) {
                Ok(worker) => workers.push(worker),
                Err(e) => tracing::warn!("Skipping malformed worker record {}: {}", key, e),
            }
        }
        Ok(workers)
    }

    /// Workers eligible for new work: online, healthy and recently seen.
    ///
    /// A store failure is logged and yields an empty list; callers treat an
    /// empty list as "no workers", never as "route anywhere".
    pub async fn get_healthy_workers(&self) -> Vec<Worker> {
        let workers = match self.get_all_workers().await {
            Ok(workers) => workers,
            Err(e) => {
                tracing::error!("Worker discovery failed: {}", e);
                return Vec::new();
            }
        };

        let now = Utc::now();
        let dead_threshold = self.config.dead_threshold();
        workers
            .into_iter()
            .filter(|w| {
                w.status == WorkerStatus::Online
                    && w.health > self.config.healthy_threshold
                    && w.is_alive(now, dead_threshold)
            })
            .collect()
    }

    /// Look up one worker
    pub async fn get_worker(&self, worker_id: &str) -> Result<Worker> {
        let value = self
            .store
            .get(&record_key(worker_id))
            .await?
            .ok_or_else(|| ConductorError::WorkerNotFound(worker_id.to_string()))?;
        Ok(serde_json::from_str(&value)?)
    }

    /// Explicitly remove a worker record
    pub async fn remove_worker(&self, worker_id: &str) -> Result<bool> {
        let removed = self.store.delete(&record_key(worker_id)).await?;
        if removed {
            tracing::info!("Removed worker {}", worker_id);
        }
        Ok(removed)
    }

    /// Delete records whose last heartbeat is older than the dead threshold,
    /// then purge entries the store already considers expired.
    ///
    /// Returns the removed worker ids.
    pub async fn sweep_dead_workers(&self) -> Result<Vec<String>> {
        let now = Utc::now();
        let dead_threshold = self.config.dead_threshold();
        let mut removed = Vec::new();

        for worker in self.get_all_workers().await? {
            if !worker.is_alive(now, dead_threshold) && self.store.delete(&worker.record_key()).await? {
                tracing::warn!(
                    "Removed dead worker {} (last heartbeat {})",
                    worker.id,
                    worker.last_heartbeat
                );
                removed.push(worker.id);
            }
        }

        let purged = self.store.purge_expired().await?;
        if purged > 0 {
            tracing::debug!("Purged {} expired registry records", purged);
        }
        Ok(removed)
    }

    /// Run [`sweep_dead_workers`](Self::sweep_dead_workers) on the configured interval
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let result =
                    tooling::logging::timed("sweep_dead_workers", registry.sweep_dead_workers()).await;
                if let Err(e) = result {
                    tracing::warn!("Dead worker sweep failed: {}", e);
                }
            }
        })
    }
}

impl Drop for WorkerRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.get_mut().take() {
            handle.abort();
        }
    }
}

async fn write_record(store: &dyn RecordStore, mut worker: Worker, config: &RegistryConfig) -> Result<Worker> {
    worker.last_heartbeat = Utc::now();
    worker.health = calculate_health(&worker.metrics);
    let value = serde_json::to_string(&worker)?;
    store.put(&worker.record_key(), value, config.record_ttl()).await?;
    Ok(worker)
}

async fn heartbeat_loop(
    store: Arc<dyn RecordStore>,
    config: RegistryConfig,
    mut worker: Worker,
    metrics: Option<MetricsSource>,
) {
    let mut interval = tokio::time::interval(config.heartbeat_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately and registration already wrote the record
    interval.tick().await;

    loop {
        interval.tick().await;
        if let Some(sample) = &metrics {
            worker.metrics = sample();
        }
        match write_record(store.as_ref(), worker.clone(), &config).await {
            Ok(written) => {
                tracing::debug!("Heartbeat for {} (health {})", written.id, written.health)
            }
            Err(e) => tracing::warn!("Heartbeat for {} failed: {}", worker.id, e),
        }
    }
}
