//! Layers and request checks shared by both HTTP surfaces

pub mod cors;
pub mod logging;
pub mod validation;

pub use cors::cors_layer;
pub use logging::logging_layer;
pub use validation::{validate_execution_id, validate_not_empty, validate_range};
