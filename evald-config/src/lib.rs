//! Domain-driven configuration for the evald evaluator runtime
//!
//! Configuration is split by functional domain, with validation, defaults,
//! and environment variable support.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{evaluator::EvaluatorConfig, logging::LoggingConfig, EvaldConfig};

// Re-export utilities
pub use domains::utils::serde_duration;
