//! The contract every process-supervision backend implements

use async_trait::async_trait;
use std::collections::BTreeSet;

use super::process::{
    next_free_port, DeployedWorker, ProcessMetrics, ProcessStatus, ScaleOutcome, WorkerOverrides,
    WorkerProcessConfig,
};
use super::templates::WorkerTemplate;
use crate::registry::WorkerType;
use crate::{ConductorError, Result};

/// Creates, supervises and removes worker processes.
///
/// Workers are addressed by their unique name. `list_workers` returns them
/// in creation order, which scaling relies on.
#[async_trait]
pub trait DeploymentAdapter: Send + Sync {
    /// Backend name for logs and the API
    fn name(&self) -> &'static str;

    async fn list_workers(&self) -> Result<Vec<DeployedWorker>>;

    async fn get_worker(&self, name: &str) -> Result<Option<DeployedWorker>>;

    /// Register and start a worker. Duplicate names and ports are rejected.
    async fn create_worker(&self, config: WorkerProcessConfig) -> Result<DeployedWorker>;

    /// Change a worker's config; a running worker is restarted to pick it up
    async fn update_worker(&self, name: &str, overrides: &WorkerOverrides) -> Result<DeployedWorker>;

    /// Stop and forget a worker. Returns whether it existed.
    async fn delete_worker(&self, name: &str) -> Result<bool>;

    async fn start_worker(&self, name: &str) -> Result<DeployedWorker>;

    async fn stop_worker(&self, name: &str) -> Result<DeployedWorker>;

    async fn get_worker_metrics(&self, name: &str) -> Result<ProcessMetrics>;

    /// Create a new worker from an existing one's config.
    ///
    /// The overrides must give the copy its own name and port; the source
    /// is never modified.
    async fn clone_worker(&self, source: &str, overrides: &WorkerOverrides) -> Result<DeployedWorker> {
        let original = self
            .get_worker(source)
            .await?
            .ok_or_else(|| ConductorError::WorkerNotFound(source.to_string()))?;

        let mut config = original.config.clone();
        config.apply(overrides);
        if config.name == original.config.name {
            return Err(ConductorError::Validation(format!(
                "Clone of {} needs a new name",
                source
            )));
        }
        if config.port == original.config.port {
            return Err(ConductorError::PortConflict(config.port));
        }
        tracing::info!("Cloning worker {} as {}", source, config.name);
        self.create_worker(config).await
    }

    async fn restart_worker(&self, name: &str) -> Result<DeployedWorker> {
        self.stop_worker(name).await?;
        self.start_worker(name).await
    }

    async fn get_worker_status(&self, name: &str) -> Result<ProcessStatus> {
        self.get_worker(name)
            .await?
            .map(|w| w.status)
            .ok_or_else(|| ConductorError::WorkerNotFound(name.to_string()))
    }

    /// Grow or shrink the fleet to `target` workers.
    ///
    /// Growing clones the newest worker (or the standard template when the
    /// fleet is empty) onto the next free ports; shrinking deletes the
    /// newest workers first.
    async fn scale_workers(&self, target: usize) -> Result<ScaleOutcome> {
        let workers = self.list_workers().await?;
        let mut outcome = ScaleOutcome {
            previous: workers.len(),
            current: workers.len(),
            ..Default::default()
        };

        if workers.len() > target {
            for worker in workers.iter().skip(target).rev() {
                if self.delete_worker(&worker.config.name).await? {
                    outcome.deleted.push(worker.config.name.clone());
                }
            }
        } else if workers.len() < target {
            let base = match workers.last() {
                Some(newest) => newest.config.clone(),
                None => WorkerTemplate::for_type(WorkerType::Standard).to_config(
                    "standard-worker",
                    3001,
                    "workflow-worker",
                ),
            };
            let mut names: BTreeSet<String> = workers.iter().map(|w| w.config.name.clone()).collect();
            let mut ports: BTreeSet<u16> = workers.iter().map(|w| w.config.port).collect();
            let stem = base.name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '-');

            for _ in workers.len()..target {
                let name = (1..)
                    .map(|n| format!("{}-{}", stem, n))
                    .find(|candidate| !names.contains(candidate))
                    .unwrap_or_else(|| format!("{}-{}", stem, uuid::Uuid::new_v4()));
                let port = next_free_port(&ports, base.port, u16::MAX - base.port)
                    .ok_or_else(|| ConductorError::Deployment("No free port left for scaling".into()))?;

                let mut config = base.clone();
                config.name = name.clone();
                config.port = port;
                self.create_worker(config).await?;

                names.insert(name.clone());
                ports.insert(port);
                outcome.created.push(name);
            }
        }

        outcome.current = self.list_workers().await?.len();
        tracing::info!(
            "Scaled {} backend from {} to {} workers",
            self.name(),
            outcome.previous,
            outcome.current
        );
        Ok(outcome)
    }
}
