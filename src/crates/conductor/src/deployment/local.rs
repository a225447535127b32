//! Local process backend
//!
//! Runs each worker as a child process of the control center and keeps the
//! worker list in a TOML document next to it. The document is plain data:
//! it is parsed and rewritten, never evaluated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::adapter::DeploymentAdapter;
use super::memory::check_unique;
use super::process::{DeployedWorker, ProcessMetrics, ProcessStatus, WorkerOverrides, WorkerProcessConfig};
use crate::{ConductorError, Result};

/// On-disk list of managed workers, one `[[worker]]` table each
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerListDocument {
    #[serde(default, rename = "worker")]
    pub workers: Vec<WorkerProcessConfig>,
}

impl WorkerListDocument {
    pub fn parse(text: &str) -> Result<Self> {
        let document: Self = toml::from_str(text)
            .map_err(|e| ConductorError::Config(format!("Invalid worker list: {}", e)))?;
        for worker in &document.workers {
            worker.validate()?;
        }
        Ok(document)
    }

    pub fn render(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConductorError::Config(format!("Cannot write worker list: {}", e)))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConductorError::Deployment(format!(
                "Cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Write through a temporary file so readers never see a partial list
    pub async fn save(&self, path: &Path) -> Result<()> {
        let text = self.render()?;
        let tmp = path.with_extension("toml.tmp");
        let io_err = |e: std::io::Error| ConductorError::Deployment(format!("Cannot write {}: {}", path.display(), e));
        tokio::fs::write(&tmp, text).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

struct Running {
    child: Child,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
struct LocalState {
    document: WorkerListDocument,
    running: HashMap<String, Running>,
    restarts: HashMap<String, u32>,
}

/// Supervises workers as local child processes
pub struct LocalProcessAdapter {
    list_path: PathBuf,
    autostart: bool,
    state: Mutex<LocalState>,
}

impl LocalProcessAdapter {
    /// Open the worker list at `list_path`, creating it on first write
    pub async fn open(list_path: impl Into<PathBuf>) -> Result<Self> {
        let list_path = list_path.into();
        let document = WorkerListDocument::load(&list_path).await?;
        tracing::info!(
            "Loaded {} workers from {}",
            document.workers.len(),
            list_path.display()
        );
        Ok(Self {
            list_path,
            autostart: true,
            state: Mutex::new(LocalState {
                document,
                ..Default::default()
            }),
        })
    }

    /// Only record workers, never spawn them
    pub fn without_autostart(mut self) -> Self {
        self.autostart = false;
        self
    }

    pub fn list_path(&self) -> &Path {
        &self.list_path
    }

    /// Start every listed worker that is not running
    pub async fn start_all(&self) -> Result<usize> {
        let names: Vec<String> = {
            let state = self.state.lock().await;
            state.document.workers.iter().map(|w| w.name.clone()).collect()
        };
        let mut started = 0;
        for name in names {
            match self.start_worker(&name).await {
                Ok(_) => started += 1,
                Err(e) => tracing::warn!("Failed to start worker {}: {}", name, e),
            }
        }
        Ok(started)
    }

    fn spawn(config: &WorkerProcessConfig) -> Result<Child> {
        Command::new(&config.script)
            .envs(config.process_env())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConductorError::Deployment(format!("Failed to start {}: {}", config.name, e)))
    }

    fn status_of(state: &mut LocalState, name: &str) -> ProcessStatus {
        match state.running.get_mut(name) {
            Some(running) => match running.child.try_wait() {
                Ok(None) => ProcessStatus::Online,
                Ok(Some(exit)) if exit.success() => ProcessStatus::Stopped,
                _ => ProcessStatus::Errored,
            },
            None => ProcessStatus::Stopped,
        }
    }

    fn describe(state: &mut LocalState, config: &WorkerProcessConfig) -> DeployedWorker {
        let status = Self::status_of(state, &config.name);
        DeployedWorker {
            config: config.clone(),
            status,
            pid: state.running.get(&config.name).and_then(|r| r.child.id()),
            restarts: state.restarts.get(&config.name).copied().unwrap_or(0),
        }
    }

    async fn kill(state: &mut LocalState, name: &str) {
        if let Some(mut running) = state.running.remove(name) {
            if let Err(e) = running.child.kill().await {
                tracing::warn!("Failed to kill worker {}: {}", name, e);
            }
        }
    }

    fn find(state: &LocalState, name: &str) -> Result<WorkerProcessConfig> {
        state
            .document
            .workers
            .iter()
            .find(|w| w.name == name)
            .cloned()
            .ok_or_else(|| ConductorError::WorkerNotFound(name.to_string()))
    }
}

#[async_trait]
impl DeploymentAdapter for LocalProcessAdapter {
    fn name(&self) -> &'static str {
        "local-process"
    }

    async fn list_workers(&self) -> Result<Vec<DeployedWorker>> {
        let mut state = self.state.lock().await;
        let configs = state.document.workers.clone();
        Ok(configs.iter().map(|c| Self::describe(&mut state, c)).collect())
    }

    async fn get_worker(&self, name: &str) -> Result<Option<DeployedWorker>> {
        let mut state = self.state.lock().await;
        let config = state.document.workers.iter().find(|w| w.name == name).cloned();
        Ok(config.map(|c| Self::describe(&mut state, &c)))
    }

    async fn create_worker(&self, config: WorkerProcessConfig) -> Result<DeployedWorker> {
        config.validate()?;
        let mut state = self.state.lock().await;
        let existing: Vec<&WorkerProcessConfig> = state.document.workers.iter().collect();
        check_unique(&existing, &config)?;

        if self.autostart {
            let child = Self::spawn(&config)?;
            state.running.insert(
                config.name.clone(),
                Running {
                    child,
                    started_at: Utc::now(),
                },
            );
        }
        state.document.workers.push(config.clone());
        if let Err(e) = state.document.save(&self.list_path).await {
            state.document.workers.pop();
            Self::kill(&mut state, &config.name).await;
            return Err(e);
        }

        tracing::info!("Created worker {} on port {}", config.name, config.port);
        Ok(Self::describe(&mut state, &config))
    }

    async fn update_worker(&self, name: &str, overrides: &WorkerOverrides) -> Result<DeployedWorker> {
        let mut state = self.state.lock().await;
        let index = state
            .document
            .workers
            .iter()
            .position(|w| w.name == name)
            .ok_or_else(|| ConductorError::WorkerNotFound(name.to_string()))?;

        let mut config = state.document.workers[index].clone();
        config.apply(overrides);
        config.validate()?;
        let others: Vec<&WorkerProcessConfig> = state
            .document
            .workers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, w)| w)
            .collect();
        check_unique(&others, &config)?;

        let previous = std::mem::replace(&mut state.document.workers[index], config.clone());
        if let Err(e) = state.document.save(&self.list_path).await {
            state.document.workers[index] = previous;
            return Err(e);
        }

        let was_running = Self::status_of(&mut state, name) == ProcessStatus::Online;
        if was_running {
            Self::kill(&mut state, name).await;
            let child = Self::spawn(&config)?;
            state.running.insert(
                config.name.clone(),
                Running {
                    child,
                    started_at: Utc::now(),
                },
            );
            *state.restarts.entry(config.name.clone()).or_default() += 1;
        }
        Ok(Self::describe(&mut state, &config))
    }

    async fn delete_worker(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(index) = state.document.workers.iter().position(|w| w.name == name) else {
            return Ok(false);
        };
        Self::kill(&mut state, name).await;
        let removed = state.document.workers.remove(index);
        if let Err(e) = state.document.save(&self.list_path).await {
            state.document.workers.insert(index, removed);
            return Err(e);
        }
        state.restarts.remove(name);
        tracing::info!("Deleted worker {}", name);
        Ok(true)
    }

    async fn start_worker(&self, name: &str) -> Result<DeployedWorker> {
        let mut state = self.state.lock().await;
        let config = Self::find(&state, name)?;
        if Self::status_of(&mut state, name) != ProcessStatus::Online {
            Self::kill(&mut state, name).await;
            let child = Self::spawn(&config)?;
            state.running.insert(
                name.to_string(),
                Running {
                    child,
                    started_at: Utc::now(),
                },
            );
        }
        Ok(Self::describe(&mut state, &config))
    }

    async fn stop_worker(&self, name: &str) -> Result<DeployedWorker> {
        let mut state = self.state.lock().await;
        let config = Self::find(&state, name)?;
        Self::kill(&mut state, name).await;
        Ok(Self::describe(&mut state, &config))
    }

    async fn restart_worker(&self, name: &str) -> Result<DeployedWorker> {
        let mut state = self.state.lock().await;
        let config = Self::find(&state, name)?;
        Self::kill(&mut state, name).await;
        let child = Self::spawn(&config)?;
        state.running.insert(
            name.to_string(),
            Running {
                child,
                started_at: Utc::now(),
            },
        );
        *state.restarts.entry(name.to_string()).or_default() += 1;
        Ok(Self::describe(&mut state, &config))
    }

    async fn get_worker_metrics(&self, name: &str) -> Result<ProcessMetrics> {
        let mut state = self.state.lock().await;
        let config = Self::find(&state, name)?;
        let worker = Self::describe(&mut state, &config);
        let uptime_secs = match (worker.status, state.running.get(name)) {
            (ProcessStatus::Online, Some(running)) => {
                (Utc::now() - running.started_at).num_seconds().max(0) as u64
            }
            _ => 0,
        };
        Ok(ProcessMetrics {
            name: config.name,
            status: worker.status,
            pid: worker.pid,
            uptime_secs,
            restarts: worker.restarts,
            max_memory_mb: config.max_memory_mb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::templates::WorkerTemplate;
    use crate::registry::WorkerType;

    fn config(name: &str, port: u16) -> WorkerProcessConfig {
        WorkerTemplate::for_type(WorkerType::Export).to_config(name, port, "workflow-worker")
    }

    #[test]
    fn test_document_round_trip() {
        let mut cfg = config("export-worker-1", 3004);
        cfg.env.insert("RUST_LOG".into(), "debug".into());
        let document = WorkerListDocument { workers: vec![cfg] };

        let text = document.render().unwrap();
        assert!(text.contains("[[worker]]"));
        assert_eq!(WorkerListDocument::parse(&text).unwrap(), document);
    }

    #[test]
    fn test_document_is_validated() {
        let text = r#"
[[worker]]
name = "w"
workerType = "standard"
script = "workflow-worker"
port = 80
maxConcurrent = 5
queueEnabled = true
maxMemoryMb = 512
"#;
        assert!(WorkerListDocument::parse(text).is_err());
        assert!(WorkerListDocument::parse("worker = 3").is_err());
    }

    #[tokio::test]
    async fn test_workers_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workers.toml");

        let adapter = LocalProcessAdapter::open(&path).await.unwrap().without_autostart();
        adapter.create_worker(config("export-worker-1", 3004)).await.unwrap();
        adapter.create_worker(config("export-worker-2", 3005)).await.unwrap();
        assert!(adapter.delete_worker("export-worker-1").await.unwrap());
        assert!(!adapter.delete_worker("export-worker-1").await.unwrap());

        let reopened = LocalProcessAdapter::open(&path).await.unwrap().without_autostart();
        let workers = reopened.list_workers().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].config.name, "export-worker-2");
        assert_eq!(workers[0].status, ProcessStatus::Stopped);
    }

    #[tokio::test]
    async fn test_missing_binary_is_deployment_error() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalProcessAdapter::open(dir.path().join("workers.toml")).await.unwrap();

        let mut cfg = config("export-worker-1", 3004);
        cfg.script = dir.path().join("no-such-binary").display().to_string();
        let err = adapter.create_worker(cfg).await.unwrap_err();
        assert!(matches!(err, ConductorError::Deployment(_)));
        assert!(adapter.list_workers().await.unwrap().is_empty());
    }
}
