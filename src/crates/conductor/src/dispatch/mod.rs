//! Control center to worker calls
//!
//! - [`WorkerClient`] - reqwest client for the worker HTTP surface
//! - [`Dispatcher`] - routes waiting jobs and posts them to workers

pub mod client;
pub mod dispatcher;

pub use client::{DispatchError, WorkerClient};
pub use dispatcher::{DispatchConfig, DispatchReport, Dispatcher};
