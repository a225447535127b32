//! Rolling dispatch latency per worker

use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};

/// Keeps the last `window` latency samples for each worker
pub struct LatencyTracker {
    window: usize,
    samples: DashMap<String, VecDeque<u64>>,
}

impl LatencyTracker {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: DashMap::new(),
        }
    }

    /// Record one latency sample in milliseconds
    pub fn track(&self, worker_id: &str, latency_ms: u64) {
        let mut history = self.samples.entry(worker_id.to_string()).or_default();
        history.push_back(latency_ms);
        while history.len() > self.window {
            history.pop_front();
        }
    }

    /// Rolling average for a worker, `None` when nothing was tracked
    pub fn average(&self, worker_id: &str) -> Option<f64> {
        let history = self.samples.get(worker_id)?;
        if history.is_empty() {
            return None;
        }
        Some(history.iter().sum::<u64>() as f64 / history.len() as f64)
    }

    /// Rolling averages for every tracked worker
    pub fn averages(&self) -> HashMap<String, f64> {
        self.samples
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| {
                let history = entry.value();
                let avg = history.iter().sum::<u64>() as f64 / history.len() as f64;
                (entry.key().clone(), avg)
            })
            .collect()
    }

    pub fn clear(&self) {
        self.samples.clear();
    }
}
