//! Domain-specific configuration modules

pub mod evaluator;
pub mod logging;
pub mod utils;

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::Validatable;

/// Complete evald configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EvaldConfig {
    /// Evaluator runtime configuration
    pub evaluator: evaluator::EvaluatorConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl EvaldConfig {
    /// Validate all configuration domains
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.evaluator.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
