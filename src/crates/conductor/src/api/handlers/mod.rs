//! API request handlers
//!
//! Control center handlers are grouped by resource; [`worker`] holds the
//! surface served by each `workflow-worker` process.

pub mod factory;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod routing;
pub mod worker;
pub mod workers;

pub use health::health;
