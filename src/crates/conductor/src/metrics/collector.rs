//! Fleet capacity sampling

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::jobs::{JobCounts, JobQueue, JobState};
use crate::registry::WorkerRegistry;
use crate::Result;

/// `[metrics]` section of the control center config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub poll_interval_secs: u64,
    /// Samples kept in memory
    pub retention: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            retention: 360,
        }
    }
}

impl MetricsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// One point-in-time view of the fleet and the queue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSample {
    pub timestamp: DateTime<Utc>,
    pub total_workers: usize,
    pub healthy_workers: usize,
    /// Sum of healthy workers' capacity
    pub total_capacity: u64,
    pub active_jobs: u64,
    /// `active_jobs / total_capacity`, 0 without capacity
    pub utilization: f64,
    pub queue: JobCounts,
    /// Completed jobs per minute since the previous sample
    pub throughput_per_minute: f64,
    /// completed / (completed + failed), absent before any job finished
    pub success_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationAction {
    ScaleUp,
    ScaleDown,
    AddWorkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityRecommendation {
    pub action: RecommendationAction,
    pub severity: Severity,
    pub message: String,
    /// Workers to add (positive) or remove (negative)
    pub worker_delta: i64,
}

/// Samples the registry and the queue into a bounded history
pub struct MetricsCollector {
    registry: Arc<WorkerRegistry>,
    queue: Arc<dyn JobQueue>,
    config: MetricsConfig,
    history: Mutex<VecDeque<MetricsSample>>,
}

impl MetricsCollector {
    pub fn new(registry: Arc<WorkerRegistry>, queue: Arc<dyn JobQueue>, config: MetricsConfig) -> Self {
        Self {
            registry,
            queue,
            history: Mutex::new(VecDeque::with_capacity(config.retention.min(1024))),
            config,
        }
    }

    /// Take a sample and append it to the history
    pub async fn collect(&self) -> Result<MetricsSample> {
        let all = match self.registry.get_all_workers().await {
            Ok(workers) => workers.len(),
            Err(e) => {
                tracing::warn!("Metrics could not list workers: {}", e);
                0
            }
        };
        let healthy = self.registry.get_healthy_workers().await;

        let mut queue = JobCounts::default();
        for state in JobState::ALL {
            queue.set(state, self.queue.count(state).await?);
        }

        let total_capacity: u64 = healthy.iter().map(|w| u64::from(w.capacity)).sum();
        let active_jobs: u64 = healthy.iter().map(|w| u64::from(w.metrics.active_jobs)).sum();
        let utilization = if total_capacity == 0 {
            0.0
        } else {
            active_jobs as f64 / total_capacity as f64
        };
        let finished = queue.completed + queue.failed;
        let success_rate = (finished > 0).then(|| queue.completed as f64 / finished as f64);

        let now = Utc::now();
        let mut history = self.history.lock();
        let throughput_per_minute = match history.back() {
            Some(previous) => {
                let minutes = (now - previous.timestamp).num_milliseconds() as f64 / 60_000.0;
                let delta = queue.completed.saturating_sub(previous.queue.completed);
                if minutes > 0.0 {
                    delta as f64 / minutes
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let sample = MetricsSample {
            timestamp: now,
            total_workers: all,
            healthy_workers: healthy.len(),
            total_capacity,
            active_jobs,
            utilization,
            queue,
            throughput_per_minute,
            success_rate,
        };
        history.push_back(sample.clone());
        while history.len() > self.config.retention.max(1) {
            history.pop_front();
        }
        Ok(sample)
    }

    /// Retained samples, oldest first
    pub fn history(&self) -> Vec<MetricsSample> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<MetricsSample> {
        self.history.lock().back().cloned()
    }

    /// Recommendations for the latest sample
    pub fn recommendations(&self) -> Vec<CapacityRecommendation> {
        self.latest().map(|s| recommend(&s)).unwrap_or_default()
    }

    /// Sample on the configured interval until the task is aborted
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let collector = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(collector.config.poll_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = collector.collect().await {
                    tracing::warn!("Metrics collection failed: {}", e);
                }
            }
        })
    }
}

/// Capacity advice for one sample
pub fn recommend(sample: &MetricsSample) -> Vec<CapacityRecommendation> {
    let mut out = Vec::new();
    if sample.healthy_workers == 0 {
        out.push(CapacityRecommendation {
            action: RecommendationAction::AddWorkers,
            severity: Severity::Critical,
            message: "No healthy workers are available".into(),
            worker_delta: 1,
        });
        return out;
    }

    let per_worker = (sample.total_capacity / sample.healthy_workers as u64).max(1);
    let backlog = sample.queue.waiting > 2 * sample.total_capacity;
    if sample.utilization > 0.8 || backlog {
        let needed = (sample.queue.waiting as f64 / per_worker as f64).ceil().max(1.0) as i64;
        out.push(CapacityRecommendation {
            action: RecommendationAction::ScaleUp,
            severity: Severity::Warning,
            message: format!(
                "Utilization {:.0}% with {} waiting jobs",
                sample.utilization * 100.0,
                sample.queue.waiting
            ),
            worker_delta: needed,
        });
    } else if sample.utilization < 0.2 && sample.healthy_workers > 1 {
        out.push(CapacityRecommendation {
            action: RecommendationAction::ScaleDown,
            severity: Severity::Info,
            message: format!(
                "Utilization {:.0}% across {} workers",
                sample.utilization * 100.0,
                sample.healthy_workers
            ),
            worker_delta: -1,
        });
    }
    out
}
