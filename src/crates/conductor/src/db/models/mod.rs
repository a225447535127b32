//! Row models for database persistence

pub mod checkpoint;
pub mod execution;
pub mod job;
pub mod registry_record;
pub mod repeatable_job;

pub use checkpoint::CheckpointRow;
pub use execution::ExecutionRecord;
pub use job::JobRow;
pub use registry_record::RegistryRecord;
pub use repeatable_job::RepeatableJobRow;

use chrono::{DateTime, TimeZone, Utc};

/// Convert a timestamp to the unix-millisecond form used by queue tables
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert a unix-millisecond column back into a timestamp
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
