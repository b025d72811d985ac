//! Configuration loading and environment variable handling

use std::path::Path;

use crate::domains::EvaldConfig;
use crate::error::{ConfigError, ConfigResult};

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "EVALD".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<EvaldConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: EvaldConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<EvaldConfig> {
        let mut config = EvaldConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<EvaldConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut EvaldConfig) -> ConfigResult<()> {
        if let Ok(id) = self.get_env_var("EVALUATOR_ID") {
            config.evaluator.evaluator_id = id;
        }

        if let Ok(id) = self.get_env_var("DRIVER_ID") {
            config.evaluator.driver_id = id;
        }

        if let Ok(interval) = self.get_env_var("HEARTBEAT_SECONDS") {
            let seconds: u64 = interval.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid HEARTBEAT_SECONDS: {}", e))
            })?;
            config.evaluator.heartbeat_interval = std::time::Duration::from_secs(seconds);
        }

        if let Ok(dir) = self.get_env_var("PID_FILE_DIR") {
            config.evaluator.pid_file_dir = Some(dir.into());
        }

        if let Ok(fatal) = self.get_env_var("TEARDOWN_FAILURES_FATAL") {
            config.evaluator.teardown_failures_fatal = fatal.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid TEARDOWN_FAILURES_FATAL: {}", e))
            })?;
        }

        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            use std::str::FromStr;
            config.logging.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "evaluator:\n  evaluator_id: eval-7\n  heartbeat_interval: 10\nlogging:\n  level: debug\n"
        )
        .unwrap();

        let loader = ConfigLoader::with_prefix("EVALD_TEST_UNSET");
        let config = loader.from_file(file.path()).unwrap();
        assert_eq!(config.evaluator.evaluator_id, "eval-7");
        assert_eq!(
            config.evaluator.heartbeat_interval,
            std::time::Duration::from_secs(10)
        );
        assert_eq!(
            config.logging.level,
            crate::domains::logging::LogLevel::Debug
        );
    }

    #[test]
    fn test_missing_identity_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "evaluator:\n  driver_id: driver\n").unwrap();

        let loader = ConfigLoader::with_prefix("EVALD_TEST_UNSET");
        assert!(loader.from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_override() {
        // Unique prefix so the test cannot collide with a real environment
        std::env::set_var("EVALD_LOADERTEST_EVALUATOR_ID", "eval-env");
        let loader = ConfigLoader::with_prefix("EVALD_LOADERTEST");
        let config = loader.from_env().unwrap();
        assert_eq!(config.evaluator.evaluator_id, "eval-env");
        std::env::remove_var("EVALD_LOADERTEST_EVALUATOR_ID");
    }
}
