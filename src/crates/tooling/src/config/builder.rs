//! Shared shape for environment-loaded configuration structs

use crate::Result;

/// A configuration that can be loaded from prefixed environment variables
/// and checked before use.
pub trait ConfigBuilder: Sized + Default {
    /// Read every field from `<prefix><NAME>` variables, falling back to
    /// defaults for variables that are not set.
    fn from_env(prefix: &str) -> Result<Self>;

    /// Reject values that would make the process misbehave.
    fn validate(&self) -> Result<()>;

    /// Load from the environment and validate in one step.
    fn load(prefix: &str) -> Result<Self> {
        let config = Self::from_env(prefix)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::get_env_parse_or;
    use crate::ToolingError;

    #[derive(Debug, Default)]
    struct SampleConfig {
        slots: u32,
    }

    impl ConfigBuilder for SampleConfig {
        fn from_env(prefix: &str) -> Result<Self> {
            Ok(Self {
                slots: get_env_parse_or(&format!("{}SLOTS", prefix), 4)?,
            })
        }

        fn validate(&self) -> Result<()> {
            if self.slots == 0 {
                return Err(ToolingError::Config("SLOTS must be positive".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_load_uses_defaults() {
        let config = SampleConfig::load("TOOLING_SAMPLE_UNSET_").unwrap();
        assert_eq!(config.slots, 4);
    }

    #[test]
    fn test_load_runs_validation() {
        std::env::set_var("TOOLING_SAMPLE_ZERO_SLOTS", "0");
        let result = SampleConfig::load("TOOLING_SAMPLE_ZERO_");
        std::env::remove_var("TOOLING_SAMPLE_ZERO_SLOTS");
        assert!(matches!(result, Err(ToolingError::Config(_))));
    }
}
