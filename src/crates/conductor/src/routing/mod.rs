//! Routing engine
//!
//! Selecting a worker for a job happens in three steps: take the job type,
//! narrow the healthy workers to those matching the type's affinity tags
//! (keeping all of them if none match), then apply the active
//! [`RoutingStrategy`].

pub mod affinity;
pub mod engine;
pub mod latency;
pub mod metrics;
pub mod select;
pub mod sticky;
pub mod strategy;

pub use affinity::AffinityRules;
pub use engine::{RoutingConfig, RoutingEngine};
pub use latency::LatencyTracker;
pub use metrics::RoutingMetrics;
pub use sticky::StickySessions;
pub use strategy::RoutingStrategy;
