//! Worker process configuration as handed to a deployment backend

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::registry::WorkerType;
use crate::{ConductorError, Result};

/// Lowest port a worker may listen on
pub const MIN_WORKER_PORT: u16 = 1024;
/// Highest per-worker concurrency accepted
pub const MAX_CONCURRENCY: u32 = 64;

fn default_instances() -> u32 {
    1
}

/// Everything a backend needs to run one worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerProcessConfig {
    pub name: String,
    pub worker_type: WorkerType,
    /// Program started for the worker
    pub script: String,
    pub port: u16,
    pub max_concurrent: u32,
    pub queue_enabled: bool,
    /// Memory limit after which the backend restarts the worker
    pub max_memory_mb: u32,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub weight: u32,
    #[serde(default = "default_instances")]
    pub instances: u32,
}

impl WorkerProcessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ConductorError::Validation("Worker name is required".into()));
        }
        if self.name.chars().any(|c| c.is_whitespace()) {
            return Err(ConductorError::Validation(format!(
                "Worker name '{}' must not contain whitespace",
                self.name
            )));
        }
        validate_port(self.port)?;
        validate_concurrency(self.max_concurrent)?;
        if self.script.trim().is_empty() {
            return Err(ConductorError::Validation("Worker script is required".into()));
        }
        if self.instances == 0 {
            return Err(ConductorError::Validation("Worker needs at least one instance".into()));
        }
        Ok(())
    }

    /// Overwrite every field the overrides set
    pub fn apply(&mut self, overrides: &WorkerOverrides) {
        if let Some(name) = &overrides.name {
            self.name = name.clone();
        }
        if let Some(worker_type) = overrides.worker_type {
            self.worker_type = worker_type;
        }
        if let Some(script) = &overrides.script {
            self.script = script.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(max_concurrent) = overrides.max_concurrent {
            self.max_concurrent = max_concurrent;
        }
        if let Some(queue_enabled) = overrides.queue_enabled {
            self.queue_enabled = queue_enabled;
        }
        if let Some(max_memory_mb) = overrides.max_memory_mb {
            self.max_memory_mb = max_memory_mb;
        }
        if let Some(env) = &overrides.env {
            self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(tags) = &overrides.tags {
            self.tags = tags.clone();
        }
        if let Some(weight) = overrides.weight {
            self.weight = weight;
        }
        if let Some(instances) = overrides.instances {
            self.instances = instances;
        }
    }

    /// Environment of the worker process.
    ///
    /// Identity and sizing variables always win over entries in `env`.
    pub fn process_env(&self) -> BTreeMap<String, String> {
        let mut vars = self.env.clone();
        let tags = self.tags.iter().cloned().collect::<Vec<_>>().join(",");
        vars.insert("WORKER_ID".into(), self.name.clone());
        vars.insert("WORKER_TYPE".into(), self.worker_type.to_string());
        vars.insert("WORKER_PORT".into(), self.port.to_string());
        vars.insert("WORKER_MAX_CONCURRENT".into(), self.max_concurrent.to_string());
        vars.insert("WORKER_CAPACITY".into(), self.max_concurrent.to_string());
        vars.insert("WORKER_QUEUE_ENABLED".into(), self.queue_enabled.to_string());
        vars.insert("WORKER_WEIGHT".into(), self.weight.to_string());
        vars.insert("WORKER_TAGS".into(), tags);
        vars
    }
}

pub fn validate_port(port: u16) -> Result<()> {
    if port < MIN_WORKER_PORT {
        return Err(ConductorError::Validation(format!(
            "Port {} is outside {}..=65535",
            port, MIN_WORKER_PORT
        )));
    }
    Ok(())
}

pub fn validate_concurrency(max_concurrent: u32) -> Result<()> {
    if !(1..=MAX_CONCURRENCY).contains(&max_concurrent) {
        return Err(ConductorError::Validation(format!(
            "maxConcurrent must be within 1..={}, got {}",
            MAX_CONCURRENCY, max_concurrent
        )));
    }
    Ok(())
}

/// Partial changes for update and clone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerOverrides {
    pub name: Option<String>,
    pub worker_type: Option<WorkerType>,
    pub script: Option<String>,
    pub port: Option<u16>,
    pub max_concurrent: Option<u32>,
    pub queue_enabled: Option<bool>,
    pub max_memory_mb: Option<u32>,
    pub env: Option<BTreeMap<String, String>>,
    pub tags: Option<BTreeSet<String>>,
    pub weight: Option<u32>,
    pub instances: Option<u32>,
}

/// Backend view of a worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Online,
    Stopped,
    Errored,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Online => "online",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// A worker known to a deployment backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedWorker {
    pub config: WorkerProcessConfig,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub restarts: u32,
}

/// Process-level figures reported by a backend
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMetrics {
    pub name: String,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub uptime_secs: u64,
    pub restarts: u32,
    pub max_memory_mb: u32,
}

/// Result of a scaling request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleOutcome {
    pub previous: usize,
    pub current: usize,
    pub created: Vec<String>,
    pub deleted: Vec<String>,
}

/// First port in `base..base + range` not in `used`
pub fn next_free_port(used: &BTreeSet<u16>, base: u16, range: u16) -> Option<u16> {
    let end = base.saturating_add(range);
    (base..end).find(|port| !used.contains(port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, port: u16) -> WorkerProcessConfig {
        WorkerProcessConfig {
            name: name.into(),
            worker_type: WorkerType::Standard,
            script: "workflow-worker".into(),
            port,
            max_concurrent: 5,
            queue_enabled: true,
            max_memory_mb: 2048,
            env: BTreeMap::new(),
            tags: BTreeSet::new(),
            weight: 0,
            instances: 1,
        }
    }

    #[test]
    fn test_validate_bounds() {
        assert!(config("w1", 3001).validate().is_ok());
        assert!(config("w1", 80).validate().is_err());
        assert!(config("", 3001).validate().is_err());

        let mut busy = config("w1", 3001);
        busy.max_concurrent = 65;
        assert!(busy.validate().is_err());
        busy.max_concurrent = 0;
        assert!(busy.validate().is_err());
    }

    #[test]
    fn test_overrides_apply_only_set_fields() {
        let mut cfg = config("w1", 3001);
        cfg.env.insert("LOG".into(), "debug".into());
        cfg.apply(&WorkerOverrides {
            port: Some(3005),
            env: Some(BTreeMap::from([("REGION".to_string(), "eu".to_string())])),
            ..Default::default()
        });
        assert_eq!(cfg.name, "w1");
        assert_eq!(cfg.port, 3005);
        assert_eq!(cfg.env.len(), 2);
    }

    #[test]
    fn test_identity_env_wins() {
        let mut cfg = config("w1", 3001);
        cfg.env.insert("WORKER_ID".into(), "spoofed".into());
        cfg.tags = ["export".to_string(), "pdf".to_string()].into();
        let env = cfg.process_env();
        assert_eq!(env["WORKER_ID"], "w1");
        assert_eq!(env["WORKER_TAGS"], "export,pdf");
    }

    #[test]
    fn test_next_free_port_skips_used() {
        let used = BTreeSet::from([3001, 3002, 3004]);
        assert_eq!(next_free_port(&used, 3001, 10), Some(3003));
        assert_eq!(next_free_port(&used, 3001, 2), None);
    }
}
