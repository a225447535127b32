//! Job type to worker tag affinity rules

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::jobs::job_types;
use crate::registry::Worker;

/// Rules registered on every new table
pub fn default_rules() -> BTreeMap<String, Vec<String>> {
    [
        (job_types::IMAGE_GENERATION, vec!["gpu", "image"]),
        (job_types::EXPORT, vec!["export"]),
        (job_types::WORKFLOW, vec!["workflow", "standard"]),
        (job_types::MEMORY_INTENSIVE, vec!["memory-optimized"]),
    ]
    .into_iter()
    .map(|(job_type, tags)| {
        (
            job_type.to_string(),
            tags.into_iter().map(String::from).collect(),
        )
    })
    .collect()
}

/// Mutable `job type -> required tags` table
pub struct AffinityRules {
    rules: RwLock<BTreeMap<String, Vec<String>>>,
}

impl Default for AffinityRules {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl AffinityRules {
    pub fn new(rules: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    pub fn set(&self, job_type: impl Into<String>, tags: Vec<String>) {
        self.rules.write().insert(job_type.into(), tags);
    }

    pub fn remove(&self, job_type: &str) -> bool {
        self.rules.write().remove(job_type).is_some()
    }

    pub fn get(&self, job_type: &str) -> Option<Vec<String>> {
        self.rules.read().get(job_type).cloned()
    }

    pub fn all(&self) -> BTreeMap<String, Vec<String>> {
        self.rules.read().clone()
    }

    /// Candidates carrying at least one tag required for `job_type`.
    ///
    /// Without a rule, or when no candidate matches, every candidate is
    /// returned unchanged; missing affinity never empties the set.
    pub fn filter(&self, job_type: &str, candidates: Vec<Worker>) -> Vec<Worker> {
        let Some(required) = self.get(job_type).filter(|tags| !tags.is_empty()) else {
            return candidates;
        };
        let matching: Vec<Worker> = candidates
            .iter()
            .filter(|w| w.has_any_tag(&required))
            .cloned()
            .collect();
        if matching.is_empty() {
            tracing::debug!(
                "No worker matches affinity {:?} for {}, using all candidates",
                required,
                job_type
            );
            candidates
        } else {
            matching
        }
    }
}
