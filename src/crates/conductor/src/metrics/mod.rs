//! Fleet metrics
//!
//! [`MetricsCollector`] samples worker capacity and queue depth on an
//! interval and derives scaling recommendations from the latest sample.

pub mod collector;

pub use collector::{
    recommend, CapacityRecommendation, MetricsCollector, MetricsConfig, MetricsSample, RecommendationAction,
    Severity,
};
