//! Repository layer for database operations

pub mod checkpoint_repo;
pub mod execution_repo;
pub mod job_repo;
pub mod registry_repo;
pub mod repeatable_repo;

pub use checkpoint_repo::CheckpointRepository;
pub use execution_repo::ExecutionRepository;
pub use job_repo::JobRepository;
pub use registry_repo::RegistryRecordRepository;
pub use repeatable_repo::RepeatableJobRepository;
