//! Worker registry
//!
//! Workers register themselves in a shared expiring record store and keep
//! their record alive with periodic heartbeats. Two independent mechanisms
//! drop dead workers: record expiry in the store, and a sweep that removes
//! records whose last heartbeat is older than the dead threshold.

pub mod health;
pub mod store;
pub mod worker;
pub mod worker_registry;

pub use health::calculate_health;
pub use store::{InMemoryRecordStore, RecordStore, SqliteRecordStore};
pub use worker::{Worker, WorkerMetrics, WorkerStatus, WorkerType};
pub use worker_registry::{MetricsSource, RegistryConfig, WorkerRegistry};
