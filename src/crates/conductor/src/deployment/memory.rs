//! Bookkeeping-only backend for dry runs and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::adapter::DeploymentAdapter;
use super::process::{DeployedWorker, ProcessMetrics, ProcessStatus, WorkerOverrides, WorkerProcessConfig};
use crate::{ConductorError, Result};

struct Entry {
    worker: DeployedWorker,
    started_at: Option<DateTime<Utc>>,
}

/// Tracks workers without starting any process
#[derive(Default)]
pub struct InMemoryAdapter {
    workers: RwLock<Vec<Entry>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(&self, name: &str, f: impl FnOnce(&mut Entry) -> T) -> Result<T> {
        let mut workers = self.workers.write();
        let entry = workers
            .iter_mut()
            .find(|e| e.worker.config.name == name)
            .ok_or_else(|| ConductorError::WorkerNotFound(name.to_string()))?;
        Ok(f(entry))
    }
}

pub(crate) fn check_unique(existing: &[&WorkerProcessConfig], config: &WorkerProcessConfig) -> Result<()> {
    if existing.iter().any(|c| c.name == config.name) {
        return Err(ConductorError::Validation(format!(
            "Worker {} already exists",
            config.name
        )));
    }
    if existing.iter().any(|c| c.port == config.port) {
        return Err(ConductorError::PortConflict(config.port));
    }
    Ok(())
}

#[async_trait]
impl DeploymentAdapter for InMemoryAdapter {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn list_workers(&self) -> Result<Vec<DeployedWorker>> {
        Ok(self.workers.read().iter().map(|e| e.worker.clone()).collect())
    }

    async fn get_worker(&self, name: &str) -> Result<Option<DeployedWorker>> {
        Ok(self
            .workers
            .read()
            .iter()
            .find(|e| e.worker.config.name == name)
            .map(|e| e.worker.clone()))
    }

    async fn create_worker(&self, config: WorkerProcessConfig) -> Result<DeployedWorker> {
        config.validate()?;
        let mut workers = self.workers.write();
        let existing: Vec<&WorkerProcessConfig> = workers.iter().map(|e| &e.worker.config).collect();
        check_unique(&existing, &config)?;

        let worker = DeployedWorker {
            config,
            status: ProcessStatus::Online,
            pid: None,
            restarts: 0,
        };
        workers.push(Entry {
            worker: worker.clone(),
            started_at: Some(Utc::now()),
        });
        tracing::info!("Created worker {} on port {}", worker.config.name, worker.config.port);
        Ok(worker)
    }

    async fn update_worker(&self, name: &str, overrides: &WorkerOverrides) -> Result<DeployedWorker> {
        let mut workers = self.workers.write();
        let index = workers
            .iter()
            .position(|e| e.worker.config.name == name)
            .ok_or_else(|| ConductorError::WorkerNotFound(name.to_string()))?;

        let mut config = workers[index].worker.config.clone();
        config.apply(overrides);
        config.validate()?;
        let others: Vec<&WorkerProcessConfig> = workers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, e)| &e.worker.config)
            .collect();
        check_unique(&others, &config)?;

        let entry = &mut workers[index];
        entry.worker.config = config;
        if entry.worker.status == ProcessStatus::Online {
            entry.worker.restarts += 1;
            entry.started_at = Some(Utc::now());
        }
        Ok(entry.worker.clone())
    }

    async fn delete_worker(&self, name: &str) -> Result<bool> {
        let mut workers = self.workers.write();
        let before = workers.len();
        workers.retain(|e| e.worker.config.name != name);
        Ok(workers.len() < before)
    }

    async fn start_worker(&self, name: &str) -> Result<DeployedWorker> {
        self.with_entry(name, |entry| {
            if entry.worker.status != ProcessStatus::Online {
                entry.worker.status = ProcessStatus::Online;
                entry.started_at = Some(Utc::now());
            }
            entry.worker.clone()
        })
    }

    async fn stop_worker(&self, name: &str) -> Result<DeployedWorker> {
        self.with_entry(name, |entry| {
            entry.worker.status = ProcessStatus::Stopped;
            entry.started_at = None;
            entry.worker.clone()
        })
    }

    async fn restart_worker(&self, name: &str) -> Result<DeployedWorker> {
        self.with_entry(name, |entry| {
            entry.worker.status = ProcessStatus::Online;
            entry.worker.restarts += 1;
            entry.started_at = Some(Utc::now());
            entry.worker.clone()
        })
    }

    async fn get_worker_metrics(&self, name: &str) -> Result<ProcessMetrics> {
        self.with_entry(name, |entry| ProcessMetrics {
            name: entry.worker.config.name.clone(),
            status: entry.worker.status,
            pid: None,
            uptime_secs: entry
                .started_at
                .map(|t| (Utc::now() - t).num_seconds().max(0) as u64)
                .unwrap_or(0),
            restarts: entry.worker.restarts,
            max_memory_mb: entry.worker.config.max_memory_mb,
        })
    }
}
