//! Load-balancing strategy names

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ConductorError;

/// Worker selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Cycle through candidates with a shared counter
    RoundRobin,
    /// Fewest active jobs
    #[default]
    LeastLoaded,
    /// Random, proportional to worker weight
    Weighted,
    /// Highest health score
    HealthBased,
    /// Prefer `high-priority` workers for elevated jobs
    PriorityBased,
    /// Lowest rolling-average dispatch latency
    LatencyBased,
    /// Largest free capacity fraction
    CapacityAware,
    /// Same worker for the same user and job type
    StickySession,
    /// Most idle CPU plus free memory
    ResourceBased,
    /// Least loaded among workers matching the job type's affinity tags
    AffinityBased,
}

impl RoutingStrategy {
    pub const ALL: [RoutingStrategy; 10] = [
        RoutingStrategy::RoundRobin,
        RoutingStrategy::LeastLoaded,
        RoutingStrategy::Weighted,
        RoutingStrategy::HealthBased,
        RoutingStrategy::PriorityBased,
        RoutingStrategy::LatencyBased,
        RoutingStrategy::CapacityAware,
        RoutingStrategy::StickySession,
        RoutingStrategy::ResourceBased,
        RoutingStrategy::AffinityBased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::RoundRobin => "round_robin",
            RoutingStrategy::LeastLoaded => "least_loaded",
            RoutingStrategy::Weighted => "weighted",
            RoutingStrategy::HealthBased => "health_based",
            RoutingStrategy::PriorityBased => "priority_based",
            RoutingStrategy::LatencyBased => "latency_based",
            RoutingStrategy::CapacityAware => "capacity_aware",
            RoutingStrategy::StickySession => "sticky_session",
            RoutingStrategy::ResourceBased => "resource_based",
            RoutingStrategy::AffinityBased => "affinity_based",
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingStrategy {
    type Err = ConductorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase().replace('-', "_");
        RoutingStrategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == name)
            .ok_or_else(|| ConductorError::Validation(format!("Unknown routing strategy: {}", s)))
    }
}
