//! API data transfer objects
//!
//! Request bodies and query strings for both HTTP surfaces.

pub mod factory;
pub mod job;
pub mod routing;
pub mod worker;

pub use factory::{BatchRequest, CloneRequest, ScaleRequest};
pub use job::{
    BulkJobsRequest, BulkPriorityRequest, CleanRequest, CleanResponse, CreateJobRequest, DelayRequest,
    JobListQuery, PriorityRequest, RepeatableRequest, SearchQuery,
};
pub use routing::{AffinityRequest, StrategyRequest};
pub use worker::{AcceptedExecution, ExecuteOptions, ExecuteRequest, ResumeBody};

use serde::{Deserialize, Serialize};

/// `GET /health` body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall status
    pub status: String,

    /// Database connection status
    pub database: String,

    /// Server or worker name
    pub service: String,

    /// Crate version
    pub version: String,

    /// Current timestamp
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(
        status: impl Into<String>,
        database: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            status: status.into(),
            database: database.into(),
            service: service.into(),
            version: crate::version().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
