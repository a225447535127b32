//! Request validation helpers

use crate::api::error::{ApiError, ApiResult};

/// Validate that a required string field is not blank
pub fn validate_not_empty(value: &str, field_name: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::ValidationError(format!("{} is required", field_name)));
    }
    Ok(())
}

/// Execution ids become store keys and URL segments
pub fn validate_execution_id(value: &str) -> ApiResult<()> {
    validate_not_empty(value, "executionId")?;
    if value.len() > 128 || value.contains(char::is_whitespace) || value.contains('/') {
        return Err(ApiError::ValidationError(format!("Invalid executionId: {:?}", value)));
    }
    Ok(())
}

/// Validate an inclusive `start..=end` listing window
pub fn validate_range(start: usize, end: usize, max_len: usize) -> ApiResult<()> {
    if end < start {
        return Err(ApiError::ValidationError(format!(
            "end ({}) must not be before start ({})",
            end, start
        )));
    }
    if end - start >= max_len {
        return Err(ApiError::ValidationError(format!(
            "at most {} jobs can be listed at once",
            max_len
        )));
    }
    Ok(())
}
