//! Runtime of a `workflow-worker` process

pub mod resources;
pub mod runtime;

pub use resources::ResourceSampler;
pub use runtime::{WorkerRuntime, WorkerStatusView};
