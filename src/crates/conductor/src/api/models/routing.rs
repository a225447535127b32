//! Routing API models

use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::api::middleware::validation::validate_not_empty;
use crate::routing::RoutingStrategy;

/// `PUT /routing/strategy`
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyRequest {
    pub strategy: RoutingStrategy,
}

/// `PUT /routing/affinity`; empty `tags` removes the rule
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffinityRequest {
    pub job_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AffinityRequest {
    pub fn validate(&self) -> ApiResult<()> {
        validate_not_empty(&self.job_type, "jobType")
    }
}
