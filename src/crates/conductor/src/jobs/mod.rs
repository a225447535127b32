//! Job queue and lifecycle management
//!
//! - [`JobQueue`] - storage primitives plus transition-checked lifecycle
//!   operations, with [`InMemoryJobQueue`] and [`SqliteJobQueue`] backends
//! - [`JobManager`] - browse, search, single and bulk actions, cleaning and
//!   recurring jobs for the control center
//! - [`RecurringScheduler`] - fires cron-scheduled jobs and promotes
//!   delayed jobs whose delay elapsed

pub mod manager;
pub mod model;
pub mod queue;
pub mod recurring;
pub mod sqlite_queue;

pub use manager::{
    BulkError, BulkResult, ExecutionSummary, JobActionResult, JobListing, JobManager, JobsConfig,
    JobsSummary, SearchField,
};
pub use model::{job_types, Job, JobCounts, JobPayload, JobPriority, JobState, NewJob, RepeatableJob};
pub use queue::{InMemoryJobQueue, JobMutation, JobQueue};
pub use recurring::{next_cron_run, parse_cron, RecurringScheduler};
pub use sqlite_queue::SqliteJobQueue;
