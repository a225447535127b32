//! Async utilities
//!
//! Retry policies with exponential backoff. The execution engine wraps every
//! checkpoint and status write in [`retry::with_retry`] so a transient store
//! outage delays the write instead of dropping it.
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::async_utils::retry::{RetryPolicy, with_retry};
//!
//! let policy = RetryPolicy::store_writes();
//! with_retry(&policy, || async { store.save_checkpoint(&checkpoint).await }).await?;
//! ```

pub mod retry;
