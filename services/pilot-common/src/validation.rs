//! Configuration validation for Pilot services.
//!
//! Provides validation logic for configuration fields, and the shared
//! `ValidationError` shape also used for record-level field violations
//! in the advisor's stage validator.

use std::str::FromStr;
use thiserror::Error;

use crate::config::{AgentsConfig, Config, ObservabilityConfig, ScheduleConfig, ServiceConfig};

/// Validation error.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.service.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.agents.validate() {
            errors.push(e);
        }
        if let Err(e) = self.schedule.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ServiceConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidValue {
                field: "service.port".into(),
                reason: "must be between 1 and 65535".into(),
            });
        }
        if self.app_name.is_empty() {
            return Err(ValidationError::MissingField {
                field: "service.app_name".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("'{}' is not one of {:?}", self.log_level, LEVELS),
            });
        }
        Ok(())
    }
}

impl Validate for AgentsConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.endpoint.is_empty() {
            return Err(ValidationError::MissingField {
                field: "agents.endpoint".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "agents.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ScheduleConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.enabled && cron::Schedule::from_str(&self.daily_trigger).is_err() {
            return Err(ValidationError::InvalidValue {
                field: "schedule.daily_trigger".into(),
                reason: format!("'{}' is not a valid cron expression", self.daily_trigger),
            });
        }
        Ok(())
    }
}
