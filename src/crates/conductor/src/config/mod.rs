//! Configuration for the two binaries
//!
//! The control center reads a TOML document ([`ControlCenterConfig`]);
//! worker processes are configured through `WORKER_*` environment
//! variables ([`WorkerConfig`]) set by the deployment backend.

pub mod control_center;
pub mod worker;

pub use control_center::{ConfigError, ControlCenterConfig, DatabaseSection, ServerSection};
pub use worker::{WorkerConfig, WORKER_ENV_PREFIX};
