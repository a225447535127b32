//! Worker deployment
//!
//! - [`DeploymentAdapter`] - create, clone, start, stop and scale worker
//!   processes on some supervision backend
//! - [`LocalProcessAdapter`] - child processes plus a TOML worker list
//! - [`InMemoryAdapter`] - bookkeeping only, for dry runs and tests
//! - [`WorkerFactory`] - validated creation with templates, automatic
//!   names and ports, batches and fleet suggestions

pub mod adapter;
pub mod factory;
pub mod local;
pub mod memory;
pub mod process;
pub mod templates;

pub use adapter::DeploymentAdapter;
pub use factory::{
    BatchError, BatchResult, CreateWorkerRequest, FactoryConfig, Suggestion, SuggestionKind,
    SuggestionPriority, WorkerFactory,
};
pub use local::{LocalProcessAdapter, WorkerListDocument};
pub use memory::InMemoryAdapter;
pub use process::{
    DeployedWorker, ProcessMetrics, ProcessStatus, ScaleOutcome, WorkerOverrides, WorkerProcessConfig,
};
pub use templates::{all_templates, WorkerTemplate};
