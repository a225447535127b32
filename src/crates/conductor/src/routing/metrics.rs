//! Selection counters

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the routing counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingMetrics {
    pub total_selections: u64,
    pub failed_selections: u64,
    pub by_worker: BTreeMap<String, u64>,
    pub by_strategy: BTreeMap<String, u64>,
    pub average_latency_ms: BTreeMap<String, f64>,
}

#[derive(Default)]
pub(crate) struct RoutingCounters {
    total: AtomicU64,
    failures: AtomicU64,
    by_worker: DashMap<String, u64>,
    by_strategy: DashMap<String, u64>,
}

impl RoutingCounters {
    pub(crate) fn record_selection(&self, worker_id: &str, strategy: &str) {
        self.total.fetch_add(1, Ordering::Relaxed);
        *self.by_worker.entry(worker_id.to_string()).or_insert(0) += 1;
        *self.by_strategy.entry(strategy.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RoutingMetrics {
        RoutingMetrics {
            total_selections: self.total.load(Ordering::Relaxed),
            failed_selections: self.failures.load(Ordering::Relaxed),
            by_worker: self
                .by_worker
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            by_strategy: self
                .by_strategy
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            average_latency_ms: BTreeMap::new(),
        }
    }

    pub(crate) fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.by_worker.clear();
        self.by_strategy.clear();
    }
}
