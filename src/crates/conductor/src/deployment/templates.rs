//! Built-in worker templates

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::process::WorkerProcessConfig;
use crate::registry::WorkerType;

/// Preset sizing for one worker type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub worker_type: WorkerType,
    pub max_memory_mb: u32,
    pub max_concurrent: u32,
    pub queue_enabled: bool,
    pub tags: Vec<&'static str>,
}

impl WorkerTemplate {
    /// Template for `worker_type`
    pub fn for_type(worker_type: WorkerType) -> Self {
        match worker_type {
            WorkerType::Standard => Self {
                name: "standard",
                description: "General-purpose workflow worker",
                worker_type,
                max_memory_mb: 2048,
                max_concurrent: 5,
                queue_enabled: true,
                tags: vec!["standard", "workflow"],
            },
            WorkerType::MemoryOptimized => Self {
                name: "memory-optimized",
                description: "Fewer, larger executions for long documents",
                worker_type,
                max_memory_mb: 4096,
                max_concurrent: 3,
                queue_enabled: true,
                tags: vec!["memory-optimized", "workflow"],
            },
            WorkerType::QueueOnly => Self {
                name: "queue-only",
                description: "Pulls every job type from the queue, no direct calls",
                worker_type,
                max_memory_mb: 2048,
                max_concurrent: 10,
                queue_enabled: true,
                tags: vec!["queue", "workflow"],
            },
            WorkerType::Gpu => Self {
                name: "gpu",
                description: "Image generation on GPU hosts",
                worker_type,
                max_memory_mb: 8192,
                max_concurrent: 2,
                queue_enabled: true,
                tags: vec!["gpu", "image"],
            },
            WorkerType::Export => Self {
                name: "export",
                description: "Document export and rendering",
                worker_type,
                max_memory_mb: 1024,
                max_concurrent: 5,
                queue_enabled: true,
                tags: vec!["export"],
            },
        }
    }

    /// Look a template up by its name
    pub fn by_name(name: &str) -> Option<Self> {
        all_templates().into_iter().find(|t| t.name == name)
    }

    /// Process config for a worker built from this template
    pub fn to_config(&self, name: impl Into<String>, port: u16, script: impl Into<String>) -> WorkerProcessConfig {
        WorkerProcessConfig {
            name: name.into(),
            worker_type: self.worker_type,
            script: script.into(),
            port,
            max_concurrent: self.max_concurrent,
            queue_enabled: self.queue_enabled,
            max_memory_mb: self.max_memory_mb,
            env: BTreeMap::new(),
            tags: self.tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            weight: 0,
            instances: 1,
        }
    }
}

pub fn all_templates() -> Vec<WorkerTemplate> {
    WorkerType::ALL.iter().map(|t| WorkerTemplate::for_type(*t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_a_template() {
        let templates = all_templates();
        assert_eq!(templates.len(), WorkerType::ALL.len());
        for t in &templates {
            assert_eq!(t.name, t.worker_type.as_str());
        }
    }

    #[test]
    fn test_template_config_is_valid() {
        let cfg = WorkerTemplate::by_name("gpu")
            .unwrap()
            .to_config("gpu-worker-1", 3010, "workflow-worker");
        assert!(cfg.validate().is_ok());
        assert!(cfg.tags.contains("image"));
        assert!(WorkerTemplate::by_name("tpu").is_none());
    }
}
