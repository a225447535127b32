//! Strategy implementations
//!
//! Every function picks one worker from a candidate slice and fails with
//! `NoWorkers` when the slice is empty. Ties go to the earliest candidate.

use rand::Rng;
use std::cmp::Ordering;
use std::sync::atomic::{self, AtomicUsize};

use super::latency::LatencyTracker;
use crate::jobs::JobPriority;
use crate::registry::Worker;
use crate::{ConductorError, Result};

/// Tag marking workers reserved for elevated-priority jobs
pub const HIGH_PRIORITY_TAG: &str = "high-priority";

fn no_workers() -> ConductorError {
    ConductorError::NoWorkers("no candidate workers".into())
}

/// First candidate with the smallest key
fn min_by_key<K: PartialOrd>(candidates: &[Worker], key: impl Fn(&Worker) -> K) -> Result<&Worker> {
    pick_by_key(candidates, key, Ordering::Less)
}

/// First candidate with the largest key
fn max_by_key<K: PartialOrd>(candidates: &[Worker], key: impl Fn(&Worker) -> K) -> Result<&Worker> {
    pick_by_key(candidates, key, Ordering::Greater)
}

/// Keep the first candidate unless a later key compares as `better`
fn pick_by_key<K: PartialOrd>(
    candidates: &[Worker],
    key: impl Fn(&Worker) -> K,
    better: Ordering,
) -> Result<&Worker> {
    let mut best: Option<(&Worker, K)> = None;
    for worker in candidates {
        let k = key(worker);
        let replace = match &best {
            None => true,
            Some((_, current)) => k.partial_cmp(current) == Some(better),
        };
        if replace {
            best = Some((worker, k));
        }
    }
    best.map(|(w, _)| w).ok_or_else(no_workers)
}

pub fn round_robin<'a>(candidates: &'a [Worker], counter: &AtomicUsize) -> Result<&'a Worker> {
    if candidates.is_empty() {
        return Err(no_workers());
    }
    let index = counter.fetch_add(1, atomic::Ordering::Relaxed) % candidates.len();
    Ok(&candidates[index])
}

pub fn least_loaded(candidates: &[Worker]) -> Result<&Worker> {
    min_by_key(candidates, |w| w.metrics.active_jobs)
}

/// Weight 0 counts as `default_weight`
pub fn weighted<'a, R: Rng + ?Sized>(
    candidates: &'a [Worker],
    default_weight: u32,
    rng: &mut R,
) -> Result<&'a Worker> {
    if candidates.is_empty() {
        return Err(no_workers());
    }
    let weight_of = |w: &Worker| -> u64 {
        let weight = if w.weight == 0 { default_weight } else { w.weight };
        u64::from(weight.max(1))
    };
    let total: u64 = candidates.iter().map(weight_of).sum();
    let mut point = rng.gen_range(0..total);
    for worker in candidates {
        let weight = weight_of(worker);
        if point < weight {
            return Ok(worker);
        }
        point -= weight;
    }
    candidates.last().ok_or_else(no_workers)
}

pub fn health_based(candidates: &[Worker]) -> Result<&Worker> {
    max_by_key(candidates, |w| w.health)
}

pub fn priority_based(candidates: &[Worker], priority: JobPriority) -> Result<&Worker> {
    if priority.is_elevated() {
        let reserved: Vec<Worker> = candidates
            .iter()
            .filter(|w| w.tags.contains(HIGH_PRIORITY_TAG))
            .cloned()
            .collect();
        if let Ok(chosen) = least_loaded(&reserved) {
            let id = chosen.id.clone();
            return candidates.iter().find(|w| w.id == id).ok_or_else(no_workers);
        }
    }
    least_loaded(candidates)
}

/// Lowest rolling average. Untracked workers rank after tracked ones; with
/// no history at all this is least-loaded selection.
pub fn latency_based<'a>(candidates: &'a [Worker], tracker: &LatencyTracker) -> Result<&'a Worker> {
    if candidates.iter().all(|w| tracker.average(&w.id).is_none()) {
        return least_loaded(candidates);
    }
    min_by_key(candidates, |w| tracker.average(&w.id).unwrap_or(f64::INFINITY))
}

pub fn capacity_aware(candidates: &[Worker]) -> Result<&Worker> {
    max_by_key(candidates, |w| {
        if w.capacity == 0 {
            0.0
        } else {
            (f64::from(w.capacity) - f64::from(w.metrics.active_jobs)) / f64::from(w.capacity)
        }
    })
}

pub fn resource_based(candidates: &[Worker]) -> Result<&Worker> {
    max_by_key(candidates, |w| {
        (100.0 - w.metrics.cpu_percent) + (100.0 - w.metrics.memory_percent)
    })
}
