//! Worker selection for queued jobs

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use super::affinity::{default_rules, AffinityRules};
use super::latency::LatencyTracker;
use super::metrics::{RoutingCounters, RoutingMetrics};
use super::select;
use super::sticky::StickySessions;
use super::strategy::RoutingStrategy;
use crate::jobs::Job;
use crate::registry::{Worker, WorkerRegistry};
use crate::{ConductorError, Result};

/// Routing settings (`[routing]` in the control center config)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Strategy active at startup
    pub strategy: RoutingStrategy,
    /// Latency samples kept per worker
    pub latency_window: usize,
    /// Maximum cached sticky sessions
    pub sticky_cache_size: usize,
    /// Weight used for workers registered without one
    pub default_weight: u32,
    /// Extra or replacement affinity rules, merged over the defaults
    pub affinity: BTreeMap<String, Vec<String>>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::LeastLoaded,
            latency_window: 100,
            sticky_cache_size: 1000,
            default_weight: 10,
            affinity: BTreeMap::new(),
        }
    }
}

/// Picks a worker for each job from the registry's healthy set
pub struct RoutingEngine {
    registry: Arc<WorkerRegistry>,
    strategy: RwLock<RoutingStrategy>,
    default_weight: u32,
    round_robin: AtomicUsize,
    latency: LatencyTracker,
    sticky: StickySessions,
    affinity: AffinityRules,
    counters: RoutingCounters,
}

impl RoutingEngine {
    pub fn new(registry: Arc<WorkerRegistry>, config: RoutingConfig) -> Self {
        let mut rules = default_rules();
        rules.extend(config.affinity);

        Self {
            registry,
            strategy: RwLock::new(config.strategy),
            default_weight: config.default_weight.max(1),
            round_robin: AtomicUsize::new(0),
            latency: LatencyTracker::new(config.latency_window),
            sticky: StickySessions::new(config.sticky_cache_size),
            affinity: AffinityRules::new(rules),
            counters: RoutingCounters::default(),
        }
    }

    /// Choose a healthy worker for `job`.
    ///
    /// Fails with `NoWorkers` when the registry reports no healthy worker,
    /// including when the registry itself is unreachable.
    pub async fn select_worker(&self, job: &Job) -> Result<Worker> {
        let healthy = self.registry.get_healthy_workers().await;
        self.select_from(job, healthy)
    }

    /// Choose among `healthy` for `job`: affinity filter, then the active strategy
    pub fn select_from(&self, job: &Job, healthy: Vec<Worker>) -> Result<Worker> {
        if healthy.is_empty() {
            self.counters.record_failure();
            return Err(ConductorError::NoWorkers(format!(
                "no healthy workers for {} job {}",
                job.job_type, job.id
            )));
        }

        let candidates = self.affinity.filter(&job.job_type, healthy);
        let strategy = self.strategy();
        let chosen = match strategy {
            RoutingStrategy::RoundRobin => select::round_robin(&candidates, &self.round_robin),
            RoutingStrategy::LeastLoaded | RoutingStrategy::AffinityBased => {
                select::least_loaded(&candidates)
            }
            RoutingStrategy::Weighted => {
                select::weighted(&candidates, self.default_weight, &mut rand::thread_rng())
            }
            RoutingStrategy::HealthBased => select::health_based(&candidates),
            RoutingStrategy::PriorityBased => select::priority_based(&candidates, job.priority),
            RoutingStrategy::LatencyBased => select::latency_based(&candidates, &self.latency),
            RoutingStrategy::CapacityAware => select::capacity_aware(&candidates),
            RoutingStrategy::StickySession => self.sticky_session(job, &candidates),
            RoutingStrategy::ResourceBased => select::resource_based(&candidates),
        }
        .map(Worker::clone);

        match chosen {
            Ok(worker) => {
                self.counters.record_selection(&worker.id, strategy.as_str());
                tracing::debug!(
                    "Routed {} job {} to worker {} ({})",
                    job.job_type,
                    job.id,
                    worker.id,
                    strategy
                );
                Ok(worker)
            }
            Err(e) => {
                self.counters.record_failure();
                Err(e)
            }
        }
    }

    fn sticky_session<'a>(&self, job: &Job, candidates: &'a [Worker]) -> Result<&'a Worker> {
        let key = StickySessions::key(job.user_id(), &job.job_type);
        if let Some(cached) = self.sticky.get(&key) {
            if let Some(worker) = candidates.iter().find(|w| w.id == cached) {
                return Ok(worker);
            }
        }
        let worker = select::least_loaded(candidates)?;
        self.sticky.insert(key, worker.id.clone());
        Ok(worker)
    }

    pub fn strategy(&self) -> RoutingStrategy {
        *self.strategy.read()
    }

    pub fn set_strategy(&self, strategy: RoutingStrategy) {
        let previous = std::mem::replace(&mut *self.strategy.write(), strategy);
        if previous != strategy {
            tracing::info!("Routing strategy changed from {} to {}", previous, strategy);
        }
    }

    pub fn available_strategies(&self) -> &'static [RoutingStrategy] {
        &RoutingStrategy::ALL
    }

    /// Record how long a dispatch to `worker_id` took
    pub fn track_latency(&self, worker_id: &str, latency_ms: u64) {
        self.latency.track(worker_id, latency_ms);
    }

    pub fn set_affinity_rule(&self, job_type: impl Into<String>, tags: Vec<String>) {
        self.affinity.set(job_type, tags);
    }

    pub fn remove_affinity_rule(&self, job_type: &str) -> bool {
        self.affinity.remove(job_type)
    }

    pub fn affinity_rules(&self) -> BTreeMap<String, Vec<String>> {
        self.affinity.all()
    }

    pub fn metrics(&self) -> RoutingMetrics {
        let mut metrics = self.counters.snapshot();
        metrics.average_latency_ms = self.latency.averages().into_iter().collect();
        metrics
    }

    /// Zero the selection counters. Latency history is kept.
    pub fn reset_metrics(&self) {
        self.counters.reset();
    }
}
