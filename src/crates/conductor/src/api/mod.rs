//! HTTP surfaces
//!
//! - control center REST API under `/api/v1` ([`create_router`])
//! - worker execution surface ([`worker_router`])
//!
//! Both answer `{"success": true, "data": ...}` on success and
//! [`ApiErrorResponse`] on failure.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use middleware::cors_layer;
pub use response::SuccessResponse;
pub use routes::{create_router, worker_router, AppState};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::api::error::{ApiError, ApiResult};
    pub use crate::api::models::*;
    pub use crate::api::response::*;
}
