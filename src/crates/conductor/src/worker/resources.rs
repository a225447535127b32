//! Host resource sampling for heartbeat metrics

use parking_lot::Mutex;
use sysinfo::System;

use crate::registry::WorkerMetrics;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Memory and CPU usage of the host the worker runs on.
///
/// CPU usage is measured between two refreshes, so the first sample after
/// construction reports whatever the initial refresh saw.
pub struct ResourceSampler {
    system: Mutex<System>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
        }
    }

    /// Refresh and write the resource fields of `metrics`
    pub fn fill(&self, metrics: &mut WorkerMetrics) {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu();
        apply_usage(
            metrics,
            system.used_memory(),
            system.total_memory(),
            system.global_cpu_info().cpu_usage() as f64,
        );
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_usage(metrics: &mut WorkerMetrics, used_bytes: u64, total_bytes: u64, cpu_percent: f64) {
    metrics.memory_used_mb = used_bytes / BYTES_PER_MB;
    metrics.memory_total_mb = total_bytes / BYTES_PER_MB;
    metrics.memory_percent = if total_bytes == 0 {
        0.0
    } else {
        used_bytes as f64 / total_bytes as f64 * 100.0
    };
    metrics.cpu_percent = cpu_percent.clamp(0.0, 100.0);
}
