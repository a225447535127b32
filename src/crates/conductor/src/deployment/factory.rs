//! Worker factory
//!
//! Validated worker creation on top of a [`DeploymentAdapter`]: naming,
//! port allocation, templates, cloning, batches, scaling and advisory
//! suggestions for the fleet shape.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::adapter::DeploymentAdapter;
use super::process::{
    next_free_port, validate_concurrency, validate_port, DeployedWorker, ScaleOutcome, WorkerOverrides,
    WorkerProcessConfig,
};
use super::templates::{all_templates, WorkerTemplate};
use crate::registry::{WorkerRegistry, WorkerType};
use crate::{ConductorError, Result};

/// `[factory]` section of the control center config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// First port handed out automatically
    pub base_port: u16,
    /// Number of ports available from `base_port`
    pub port_range: u16,
    /// Worker list kept by the local process backend
    pub worker_list_file: String,
    /// Program started for new workers
    pub worker_binary: String,
    /// Average load (active / capacity) above which scaling up is suggested
    pub load_threshold: f64,
    /// Record workers without starting processes
    pub dry_run: bool,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            base_port: 3001,
            port_range: 100,
            worker_list_file: "workers.toml".to_string(),
            worker_binary: "workflow-worker".to_string(),
            load_threshold: 0.8,
            dry_run: false,
        }
    }
}

/// Request body for creating one worker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateWorkerRequest {
    pub name: Option<String>,
    /// Generate `<type>-worker-<n>` when no name is given
    pub auto_name: bool,
    pub worker_type: Option<String>,
    pub port: Option<u16>,
    pub max_concurrent: Option<u32>,
    pub queue_enabled: Option<bool>,
    pub max_memory_mb: Option<u32>,
    pub script: Option<String>,
    pub env: Option<BTreeMap<String, String>>,
    pub tags: Option<BTreeSet<String>>,
    pub weight: Option<u32>,
    pub instances: Option<u32>,
}

impl CreateWorkerRequest {
    /// Check everything that does not depend on the current fleet
    pub fn validate(&self) -> Result<WorkerType> {
        let has_name = self.name.as_deref().map_or(false, |n| !n.trim().is_empty());
        if !has_name && !self.auto_name {
            return Err(ConductorError::Validation(
                "Worker name is required unless autoName is set".into(),
            ));
        }
        let worker_type = match self.worker_type.as_deref() {
            Some(t) => t.parse::<WorkerType>()?,
            None => WorkerType::Standard,
        };
        if let Some(port) = self.port {
            validate_port(port)?;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            validate_concurrency(max_concurrent)?;
        }
        Ok(worker_type)
    }

    fn overrides(&self) -> WorkerOverrides {
        WorkerOverrides {
            script: self.script.clone(),
            max_concurrent: self.max_concurrent,
            queue_enabled: self.queue_enabled,
            max_memory_mb: self.max_memory_mb,
            env: self.env.clone(),
            tags: self.tags.clone(),
            weight: self.weight,
            instances: self.instances,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    pub index: usize,
    pub name: Option<String>,
    pub error: String,
}

/// Per-item outcome of a batch creation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub created: Vec<DeployedWorker>,
    pub errors: Vec<BatchError>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestionKind {
    CreateWorker,
    ScaleUp,
    ScaleDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionPriority {
    High,
    Medium,
    Low,
}

/// Advisory change to the fleet; never applied automatically
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub priority: SuggestionPriority,
    pub worker_type: Option<WorkerType>,
    pub message: String,
}

/// Creates and manages workers through a deployment backend
pub struct WorkerFactory {
    adapter: Arc<dyn DeploymentAdapter>,
    registry: Option<Arc<WorkerRegistry>>,
    config: FactoryConfig,
    /// Serialises name and port allocation
    allocation: Mutex<()>,
}

impl WorkerFactory {
    pub fn new(adapter: Arc<dyn DeploymentAdapter>, config: FactoryConfig) -> Self {
        Self {
            adapter,
            registry: None,
            config,
            allocation: Mutex::new(()),
        }
    }

    /// Use live registry load for suggestions
    pub fn with_registry(mut self, registry: Arc<WorkerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn adapter(&self) -> &Arc<dyn DeploymentAdapter> {
        &self.adapter
    }

    pub fn list_templates(&self) -> Vec<WorkerTemplate> {
        all_templates()
    }

    pub async fn list_workers(&self) -> Result<Vec<DeployedWorker>> {
        self.adapter.list_workers().await
    }

    /// Validate a request, pick its name and port, then create the worker
    pub async fn create_worker(&self, request: CreateWorkerRequest) -> Result<DeployedWorker> {
        let worker_type = request.validate()?;
        let _guard = self.allocation.lock().await;
        let existing = self.adapter.list_workers().await?;

        let name = match request.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => auto_name(worker_type.as_str(), "worker", &existing),
        };
        if existing.iter().any(|w| w.config.name == name) {
            return Err(ConductorError::Validation(format!("Worker {} already exists", name)));
        }
        let port = self.choose_port(request.port, &existing)?;

        let mut config = WorkerTemplate::for_type(worker_type).to_config(name, port, &self.config.worker_binary);
        config.apply(&request.overrides());
        config.validate()?;

        tracing::info!("Factory creating {} worker {} on port {}", worker_type, config.name, port);
        self.adapter.create_worker(config).await
    }

    /// Create a worker from a named template, auto-naming unless overridden
    pub async fn create_from_template(&self, template: &str, overrides: WorkerOverrides) -> Result<DeployedWorker> {
        let template = WorkerTemplate::by_name(template)
            .ok_or_else(|| ConductorError::Validation(format!("Unknown template: {}", template)))?;
        let request = CreateWorkerRequest {
            auto_name: overrides.name.is_none(),
            name: overrides.name.clone(),
            worker_type: Some(template.worker_type.to_string()),
            port: overrides.port,
            max_concurrent: overrides.max_concurrent,
            queue_enabled: overrides.queue_enabled,
            max_memory_mb: overrides.max_memory_mb,
            script: overrides.script.clone(),
            env: overrides.env.clone(),
            tags: overrides.tags.clone(),
            weight: overrides.weight,
            instances: overrides.instances,
        };
        self.create_worker(request).await
    }

    /// Copy an existing worker's effective config under a new name and port
    pub async fn clone_worker(&self, source: &str, overrides: WorkerOverrides) -> Result<DeployedWorker> {
        let _guard = self.allocation.lock().await;
        let existing = self.adapter.list_workers().await?;
        if !existing.iter().any(|w| w.config.name == source) {
            return Err(ConductorError::WorkerNotFound(source.to_string()));
        }
        if let Some(max_concurrent) = overrides.max_concurrent {
            validate_concurrency(max_concurrent)?;
        }

        let name = match overrides.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => auto_name(source, "clone", &existing),
        };
        let port = self.choose_port(overrides.port, &existing)?;
        let overrides = WorkerOverrides {
            name: Some(name),
            port: Some(port),
            ..overrides
        };
        self.adapter.clone_worker(source, &overrides).await
    }

    /// Create several workers; failures are reported per item
    pub async fn create_batch(&self, requests: Vec<CreateWorkerRequest>) -> BatchResult {
        let total = requests.len();
        let mut created = Vec::new();
        let mut errors = Vec::new();
        for (index, request) in requests.into_iter().enumerate() {
            let name = request.name.clone();
            match self.create_worker(request).await {
                Ok(worker) => created.push(worker),
                Err(e) => {
                    tracing::warn!("Batch item {} failed: {}", index, e);
                    errors.push(BatchError {
                        index,
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }
        BatchResult { created, errors, total }
    }

    pub async fn delete_worker(&self, name: &str) -> Result<bool> {
        self.adapter.delete_worker(name).await
    }

    pub async fn scale(&self, target: usize) -> Result<ScaleOutcome> {
        let _guard = self.allocation.lock().await;
        self.adapter.scale_workers(target).await
    }

    /// Advice on the fleet shape, most urgent first
    pub async fn suggestions(&self) -> Result<Vec<Suggestion>> {
        let deployed = self.adapter.list_workers().await?;
        let mut suggestions = Vec::new();

        if deployed.is_empty() {
            suggestions.push(Suggestion {
                kind: SuggestionKind::CreateWorker,
                priority: SuggestionPriority::High,
                worker_type: Some(WorkerType::Standard),
                message: "No workers are deployed; create a standard worker".into(),
            });
            return Ok(suggestions);
        }

        let has_type = |t: WorkerType| deployed.iter().any(|w| w.config.worker_type == t);
        if !has_type(WorkerType::MemoryOptimized) {
            suggestions.push(Suggestion {
                kind: SuggestionKind::CreateWorker,
                priority: SuggestionPriority::Low,
                worker_type: Some(WorkerType::MemoryOptimized),
                message: "No memory-optimized worker for long documents".into(),
            });
        }
        if !has_type(WorkerType::Export) {
            suggestions.push(Suggestion {
                kind: SuggestionKind::CreateWorker,
                priority: SuggestionPriority::Low,
                worker_type: Some(WorkerType::Export),
                message: "No export worker; export jobs share workflow workers".into(),
            });
        }

        if let Some(registry) = &self.registry {
            let workers = registry.get_healthy_workers().await;
            if !workers.is_empty() {
                let load: f64 = workers
                    .iter()
                    .map(|w| f64::from(w.metrics.active_jobs) / f64::from(w.capacity.max(1)))
                    .sum::<f64>()
                    / workers.len() as f64;
                if load > self.config.load_threshold {
                    suggestions.push(Suggestion {
                        kind: SuggestionKind::ScaleUp,
                        priority: SuggestionPriority::High,
                        worker_type: None,
                        message: format!(
                            "Average load {:.0}% is above {:.0}%",
                            load * 100.0,
                            self.config.load_threshold * 100.0
                        ),
                    });
                } else if deployed.len() > 2 && workers.iter().all(|w| w.metrics.active_jobs == 0) {
                    suggestions.push(Suggestion {
                        kind: SuggestionKind::ScaleDown,
                        priority: SuggestionPriority::Medium,
                        worker_type: None,
                        message: format!("All {} workers are idle", deployed.len()),
                    });
                }
            }
        }

        suggestions.sort_by_key(|s| s.priority);
        Ok(suggestions)
    }

    fn choose_port(&self, requested: Option<u16>, existing: &[DeployedWorker]) -> Result<u16> {
        let used: BTreeSet<u16> = existing.iter().map(|w| w.config.port).collect();
        match requested {
            Some(port) => {
                validate_port(port)?;
                if used.contains(&port) {
                    return Err(ConductorError::PortConflict(port));
                }
                Ok(port)
            }
            None => next_free_port(&used, self.config.base_port, self.config.port_range).ok_or_else(|| {
                ConductorError::Deployment(format!(
                    "No free port in {}..{}",
                    self.config.base_port,
                    self.config.base_port.saturating_add(self.config.port_range)
                ))
            }),
        }
    }
}

/// Smallest `<stem>-<infix>-<n>` not taken by an existing worker
fn auto_name(stem: &str, infix: &str, existing: &[DeployedWorker]) -> String {
    let taken: BTreeSet<&str> = existing.iter().map(|w| w.config.name.as_str()).collect();
    (1..)
        .map(|n| format!("{}-{}-{}", stem, infix, n))
        .find(|name| !taken.contains(name.as_str()))
        .unwrap_or_else(|| format!("{}-{}-{}", stem, infix, uuid::Uuid::new_v4()))
}
