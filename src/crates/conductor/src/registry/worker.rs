//! Worker records and worker types

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::jobs::job_types;
use crate::ConductorError;

/// The kinds of worker the fleet runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerType {
    /// General-purpose workflow worker
    Standard,
    /// Large-memory worker for heavy documents
    MemoryOptimized,
    /// GPU-backed worker for image generation
    Gpu,
    /// Export and document rendering worker
    Export,
    /// Worker that only pulls from the queue and never takes direct calls
    QueueOnly,
}

impl WorkerType {
    /// Every worker type, in display order
    pub const ALL: [WorkerType; 5] = [
        WorkerType::Standard,
        WorkerType::MemoryOptimized,
        WorkerType::Gpu,
        WorkerType::Export,
        WorkerType::QueueOnly,
    ];

    /// Stable kebab-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerType::Standard => "standard",
            WorkerType::MemoryOptimized => "memory-optimized",
            WorkerType::Gpu => "gpu",
            WorkerType::Export => "export",
            WorkerType::QueueOnly => "queue-only",
        }
    }

    /// Tags a worker of this type advertises unless configured otherwise
    pub fn default_tags(&self) -> &'static [&'static str] {
        match self {
            WorkerType::Standard => &["standard", "workflow"],
            WorkerType::MemoryOptimized => &["memory-optimized", "workflow"],
            WorkerType::Gpu => &["gpu", "image"],
            WorkerType::Export => &["export"],
            WorkerType::QueueOnly => &["queue", "workflow"],
        }
    }

    /// Job types a worker of this type pulls from the queue
    pub fn accepted_job_types(&self) -> &'static [&'static str] {
        match self {
            WorkerType::Standard => &[job_types::WORKFLOW],
            WorkerType::MemoryOptimized => &[job_types::WORKFLOW, job_types::MEMORY_INTENSIVE],
            WorkerType::Gpu => &[job_types::IMAGE_GENERATION],
            WorkerType::Export => &[job_types::EXPORT],
            WorkerType::QueueOnly => &[
                job_types::WORKFLOW,
                job_types::IMAGE_GENERATION,
                job_types::EXPORT,
                job_types::MEMORY_INTENSIVE,
            ],
        }
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerType {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkerType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| ConductorError::Validation(format!("Unknown worker type: {}", s)))
    }
}

/// Worker liveness status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Online,
    Offline,
}

/// Resource and job counters reported with every heartbeat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_percent: f64,
    pub cpu_percent: f64,
    pub active_jobs: u32,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
}

impl WorkerMetrics {
    /// Failed share of finished jobs, or `None` before any job finished
    pub fn error_rate(&self) -> Option<f64> {
        let finished = self.completed_jobs + self.failed_jobs;
        if finished == 0 {
            None
        } else {
            Some(self.failed_jobs as f64 / finished as f64)
        }
    }

    /// Total jobs this worker has finished
    pub fn finished_jobs(&self) -> u64 {
        self.completed_jobs + self.failed_jobs
    }
}

/// A registered worker as seen by the control center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub worker_type: WorkerType,
    /// Base URL of the worker's HTTP surface
    pub endpoint: String,
    /// Maximum concurrent executions
    pub capacity: u32,
    /// Relative weight for weighted routing; 0 means "use the default"
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Health score in 0..=100
    pub health: u8,
    #[serde(default)]
    pub metrics: WorkerMetrics,
    pub last_heartbeat: DateTime<Utc>,
    pub status: WorkerStatus,
}

impl Worker {
    /// Create an online worker with full health and the type's default tags
    pub fn new(id: impl Into<String>, worker_type: WorkerType, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            worker_type,
            endpoint: endpoint.into(),
            capacity: 5,
            weight: 0,
            tags: worker_type
                .default_tags()
                .iter()
                .map(|t| t.to_string())
                .collect(),
            health: 100,
            metrics: WorkerMetrics::default(),
            last_heartbeat: Utc::now(),
            status: WorkerStatus::Online,
        }
    }

    /// Set the concurrent execution capacity
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the routing weight
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Replace the tag set
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the active job count
    pub fn with_active_jobs(mut self, active: u32) -> Self {
        self.metrics.active_jobs = active;
        self
    }

    /// Whether the last heartbeat is within `dead_threshold` of `now`
    pub fn is_alive(&self, now: DateTime<Utc>, dead_threshold: std::time::Duration) -> bool {
        let threshold = ChronoDuration::from_std(dead_threshold)
            .unwrap_or_else(|_| ChronoDuration::days(365 * 100));
        now.signed_duration_since(self.last_heartbeat) < threshold
    }

    /// Whether the worker carries at least one of `tags`
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }

    /// Free execution slots
    pub fn available_slots(&self) -> u32 {
        self.capacity.saturating_sub(self.metrics.active_jobs)
    }

    /// Registry key for this worker's record
    pub fn record_key(&self) -> String {
        record_key(&self.id)
    }
}

/// Key prefix shared by all worker records
pub const WORKER_KEY_PREFIX: &str = "workers:";

/// Registry key for a worker id
pub fn record_key(worker_id: &str) -> String {
    format!("{}{}", WORKER_KEY_PREFIX, worker_id)
}
