//! Evaluator runtime configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};

/// Evaluator runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Identity of this evaluator, assigned by the driver at allocation time
    pub evaluator_id: String,

    /// Identity of the driver this evaluator reports to
    pub driver_id: String,

    /// Interval between periodic heartbeat status pushes
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    /// Directory for the write-once pid marker file; disabled when unset
    #[serde(default)]
    pub pid_file_dir: Option<PathBuf>,

    /// Whether a failure during context teardown escalates to a failure
    /// report of its own. Off by default: teardown failures are logged
    /// and otherwise ignored.
    #[serde(default = "crate::domains::utils::default_false")]
    pub teardown_failures_fatal: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            evaluator_id: String::new(),
            driver_id: "driver".to_string(),
            heartbeat_interval: default_heartbeat_interval(),
            pid_file_dir: None,
            teardown_failures_fatal: false,
        }
    }
}

impl Validatable for EvaluatorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.evaluator_id, "evaluator_id", self.domain_name())?;
        validate_required_string(&self.driver_id, "driver_id", self.domain_name())?;
        validate_positive(
            self.heartbeat_interval.as_secs(),
            "heartbeat_interval",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "evaluator"
    }
}

// Default value functions
fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluator_config_defaults() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert!(!config.teardown_failures_fatal);
        assert!(config.pid_file_dir.is_none());
    }

    #[test]
    fn test_evaluator_config_validation() {
        let mut config = EvaluatorConfig {
            evaluator_id: "eval-1".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        // Missing identity
        config.evaluator_id = String::new();
        assert!(config.validate().is_err());

        // Zero heartbeat interval
        config.evaluator_id = "eval-1".to_string();
        config.heartbeat_interval = Duration::from_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heartbeat_interval_serde_seconds() {
        let yaml = "evaluator_id: eval-1\nheartbeat_interval: 30\n";
        let config: EvaluatorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }
}
