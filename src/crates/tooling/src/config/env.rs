//! Environment variable getters

use crate::{Result, ToolingError};
use std::env;
use std::str::FromStr;

/// Read an environment variable.
///
/// Returns `Ok(None)` when the variable is unset and an error when it holds
/// invalid UTF-8.
pub fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(val) => Ok(Some(val)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ToolingError::Config(format!(
            "{} contains invalid UTF-8",
            key
        ))),
    }
}

/// Read and parse an environment variable.
///
/// ```rust,ignore
/// let port: Option<u16> = get_env_parse("WORKER_PORT")?;
/// ```
pub fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key)? {
        Some(val) => {
            let parsed = val.trim().parse::<T>().map_err(|e| {
                ToolingError::Config(format!("{} has invalid value '{}': {}", key, val, e))
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Read an environment variable, falling back to `default` when unset.
pub fn get_env_or(key: &str, default: impl Into<String>) -> Result<String> {
    Ok(get_env(key)?.unwrap_or_else(|| default.into()))
}

/// Read and parse an environment variable, falling back to `default` when
/// unset. A set but malformed value is still an error.
pub fn get_env_parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(get_env_parse(key)?.unwrap_or(default))
}

/// Read a boolean environment variable.
///
/// Accepts `true/1/yes/on` and `false/0/no/off`, case-insensitively.
pub fn get_env_bool(key: &str) -> Result<Option<bool>> {
    match get_env(key)? {
        Some(val) => {
            let result = match val.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => {
                    return Err(ToolingError::Config(format!(
                        "{} has invalid boolean value '{}'",
                        key, val
                    )))
                }
            };
            Ok(Some(result))
        }
        None => Ok(None),
    }
}

/// Read a comma-separated list, trimming entries and dropping empty ones.
///
/// `WORKER_TAGS="gpu, image,,"` yields `["gpu", "image"]`.
pub fn get_env_list(key: &str) -> Result<Option<Vec<String>>> {
    Ok(get_env(key)?.map(|val| {
        val.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }))
}
