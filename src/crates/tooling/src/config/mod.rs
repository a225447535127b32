//! Configuration helpers
//!
//! Workers are configured almost entirely through environment variables
//! (`WORKER_ID`, `WORKER_PORT`, `WORKER_TAGS`, ...). The getters here turn
//! missing variables into `None` and malformed ones into
//! [`ToolingError::Config`](crate::ToolingError::Config) naming the variable.
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::config::{get_env_list, get_env_parse_or};
//!
//! let port: u16 = get_env_parse_or("WORKER_PORT", 3001)?;
//! let tags = get_env_list("WORKER_TAGS")?.unwrap_or_default();
//! ```

mod builder;
mod env;

pub use builder::ConfigBuilder;
pub use env::{get_env, get_env_bool, get_env_list, get_env_or, get_env_parse, get_env_parse_or};
