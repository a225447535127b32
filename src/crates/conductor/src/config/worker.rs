//! Environment configuration of a `workflow-worker` process

use std::collections::BTreeSet;
use std::time::Duration;

use tooling::config::{get_env, get_env_bool, get_env_list, get_env_or, get_env_parse_or, ConfigBuilder};
use tooling::ToolingError;

use crate::deployment::process::{validate_concurrency, validate_port};
use crate::registry::{RegistryConfig, Worker, WorkerType};

/// Prefix of every worker variable
pub const WORKER_ENV_PREFIX: &str = "WORKER_";

/// Settings a worker reads from `WORKER_*` variables and `DATABASE_URL`
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// `WORKER_ID`, a generated id when unset
    pub worker_id: String,
    pub worker_type: WorkerType,
    pub max_concurrent: u32,
    /// Pull jobs from the shared queue in addition to direct calls
    pub queue_enabled: bool,
    pub host: String,
    pub port: u16,
    /// Empty means the type's default tags
    pub tags: BTreeSet<String>,
    pub weight: u32,
    /// Advertised capacity, `max_concurrent` when unset
    pub capacity: u32,
    pub database_url: String,
    pub poll_interval_ms: u64,
    pub stuck_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    /// Lifetime of the registry record without a heartbeat
    pub record_ttl_secs: u64,
    /// How long shutdown waits for stopped executions to finish their writes
    pub shutdown_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4().simple()),
            worker_type: WorkerType::Standard,
            max_concurrent: 5,
            queue_enabled: true,
            host: "127.0.0.1".to_string(),
            port: 3001,
            tags: BTreeSet::new(),
            weight: 0,
            capacity: 5,
            database_url: "sqlite://conductor.db".to_string(),
            poll_interval_ms: 1000,
            stuck_timeout_secs: 2 * 60 * 60,
            heartbeat_interval_secs: 30,
            record_ttl_secs: 120,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ConfigBuilder for WorkerConfig {
    fn from_env(prefix: &str) -> tooling::Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| format!("{}{}", prefix, name);

        let worker_type = match get_env(&var("TYPE"))? {
            Some(raw) => raw
                .parse::<WorkerType>()
                .map_err(|e| ToolingError::Config(format!("{}: {}", var("TYPE"), e)))?,
            None => defaults.worker_type,
        };
        let max_concurrent = get_env_parse_or(&var("MAX_CONCURRENT"), defaults.max_concurrent)?;

        Ok(Self {
            worker_id: get_env_or(&var("ID"), defaults.worker_id)?,
            worker_type,
            max_concurrent,
            queue_enabled: get_env_bool(&var("QUEUE_ENABLED"))?.unwrap_or(defaults.queue_enabled),
            host: get_env_or(&var("HOST"), defaults.host)?,
            port: get_env_parse_or(&var("PORT"), defaults.port)?,
            tags: get_env_list(&var("TAGS"))?
                .unwrap_or_default()
                .into_iter()
                .collect(),
            weight: get_env_parse_or(&var("WEIGHT"), defaults.weight)?,
            capacity: get_env_parse_or(&var("CAPACITY"), max_concurrent)?,
            database_url: get_env_or("DATABASE_URL", defaults.database_url)?,
            poll_interval_ms: get_env_parse_or(&var("POLL_INTERVAL_MS"), defaults.poll_interval_ms)?,
            stuck_timeout_secs: get_env_parse_or(&var("STUCK_TIMEOUT_SECS"), defaults.stuck_timeout_secs)?,
            heartbeat_interval_secs: get_env_parse_or(&var("HEARTBEAT_SECS"), defaults.heartbeat_interval_secs)?,
            record_ttl_secs: get_env_parse_or(&var("RECORD_TTL_SECS"), defaults.record_ttl_secs)?,
            shutdown_timeout_secs: get_env_parse_or(&var("SHUTDOWN_TIMEOUT_SECS"), defaults.shutdown_timeout_secs)?,
        })
    }

    fn validate(&self) -> tooling::Result<()> {
        if self.worker_id.trim().is_empty() {
            return Err(ToolingError::Config("WORKER_ID must not be empty".into()));
        }
        validate_concurrency(self.max_concurrent).map_err(|e| ToolingError::Config(e.to_string()))?;
        validate_port(self.port).map_err(|e| ToolingError::Config(e.to_string()))?;
        if self.capacity == 0 {
            return Err(ToolingError::Config("WORKER_CAPACITY must be positive".into()));
        }
        if self.heartbeat_interval_secs == 0 || self.record_ttl_secs <= self.heartbeat_interval_secs {
            return Err(ToolingError::Config(
                "WORKER_RECORD_TTL_SECS must exceed a positive WORKER_HEARTBEAT_SECS".into(),
            ));
        }
        Ok(())
    }
}

impl WorkerConfig {
    /// Load from `WORKER_*` variables
    pub fn from_environment() -> crate::Result<Self> {
        Ok(Self::load(WORKER_ENV_PREFIX)?)
    }

    /// Address the HTTP surface binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL the control center calls
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn stuck_timeout(&self) -> Duration {
        Duration::from_secs(self.stuck_timeout_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Heartbeat settings for this worker's registry record
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            record_ttl_secs: self.record_ttl_secs,
            heartbeat_interval_secs: self.heartbeat_interval_secs,
            ..RegistryConfig::default()
        }
    }

    /// Job types this worker pulls from the queue
    pub fn accepted_job_types(&self) -> Vec<String> {
        self.worker_type
            .accepted_job_types()
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    /// Registry record describing this worker
    pub fn to_worker(&self) -> Worker {
        let worker = Worker::new(&self.worker_id, self.worker_type, self.endpoint())
            .with_capacity(self.capacity)
            .with_weight(self.weight);
        if self.tags.is_empty() {
            worker
        } else {
            worker.with_tags(self.tags.iter().cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_vars<T>(prefix: &str, vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        for (name, value) in vars {
            std::env::set_var(format!("{}{}", prefix, name), value);
        }
        let result = f();
        for (name, _) in vars {
            std::env::remove_var(format!("{}{}", prefix, name));
        }
        result
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = WorkerConfig::load("CONDUCTOR_TEST_UNSET_").unwrap();
        assert_eq!(config.worker_type, WorkerType::Standard);
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.capacity, 5);
        assert!(config.queue_enabled);
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    fn test_reads_prefixed_variables() {
        let prefix = "CONDUCTOR_TEST_READ_";
        let config = with_vars(
            prefix,
            &[
                ("ID", "gpu-1"),
                ("TYPE", "gpu"),
                ("MAX_CONCURRENT", "2"),
                ("QUEUE_ENABLED", "false"),
                ("PORT", "3100"),
                ("TAGS", "gpu, image"),
                ("WEIGHT", "30"),
            ],
            || WorkerConfig::load(prefix),
        )
        .unwrap();

        assert_eq!(config.worker_id, "gpu-1");
        assert_eq!(config.worker_type, WorkerType::Gpu);
        assert_eq!(config.capacity, 2);
        assert!(!config.queue_enabled);
        assert_eq!(config.endpoint(), "http://127.0.0.1:3100");

        let worker = config.to_worker();
        assert_eq!(worker.weight, 30);
        assert!(worker.tags.contains("image"));
        assert_eq!(config.accepted_job_types(), vec!["image-generation".to_string()]);
    }

    #[test]
    fn test_validation_bounds() {
        let prefix = "CONDUCTOR_TEST_BOUNDS_";
        let too_many = with_vars(prefix, &[("MAX_CONCURRENT", "65")], || WorkerConfig::load(prefix));
        assert!(matches!(too_many, Err(ToolingError::Config(_))));

        let low_port = with_vars(prefix, &[("PORT", "80")], || WorkerConfig::load(prefix));
        assert!(matches!(low_port, Err(ToolingError::Config(_))));

        let bad_type = with_vars(prefix, &[("TYPE", "quantum")], || WorkerConfig::load(prefix));
        assert!(matches!(bad_type, Err(ToolingError::Config(_))));

        let short_ttl = with_vars(prefix, &[("HEARTBEAT_SECS", "60"), ("RECORD_TTL_SECS", "60")], || {
            WorkerConfig::load(prefix)
        });
        assert!(matches!(short_ttl, Err(ToolingError::Config(_))));
    }

    #[test]
    fn test_registry_settings_from_environment() {
        let prefix = "CONDUCTOR_TEST_HEARTBEAT_";
        let config = with_vars(
            prefix,
            &[("HEARTBEAT_SECS", "5"), ("RECORD_TTL_SECS", "20"), ("SHUTDOWN_TIMEOUT_SECS", "3")],
            || WorkerConfig::load(prefix),
        )
        .unwrap();

        let registry = config.registry_config();
        assert_eq!(registry.heartbeat_interval_secs, 5);
        assert_eq!(registry.record_ttl_secs, 20);
        assert_eq!(registry.dead_threshold_secs, RegistryConfig::default().dead_threshold_secs);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(3));
    }
}
