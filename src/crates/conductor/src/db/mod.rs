//! Persistence layer
//!
//! SQLite connectivity, row models and repositories for execution records,
//! checkpoints, registry records, the shared job queue and repeatable jobs.

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{DatabaseConnection, DatabasePool};
pub use error::{DatabaseError, DbResult};
