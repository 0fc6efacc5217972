//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{Config, StorageBackend};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Outcome of [`ConfigValidator::validate`].
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationError::new(path, message));
    }

    pub fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationWarning::new(path, message));
    }

    /// First error as a [`ConfigError`], for callers that stop on failure.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(ConfigError::InvalidValue {
                field: err.path,
                message: err.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: &str, message: &str) -> Self {
        Self {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: &str, message: &str) -> Self {
        Self {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_engine(config, &mut result);
        Self::validate_backends(config, &mut result);
        Self::validate_storage(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_engine(config: &Config, result: &mut ValidationResult) {
        let engine = &config.engine;
        if engine.timeout_seconds == 0 {
            result.add_error("engine.timeout_seconds", "must be greater than zero");
        }
        if engine.adapter_retry_attempts == 0 {
            result.add_error("engine.adapter_retry_attempts", "must be at least 1");
        }
        if engine.event_buffer == 0 {
            result.add_error("engine.event_buffer", "must be greater than zero");
        }
        if engine.retry_base_delay_ms == 0 {
            result.add_warning("engine.retry_base_delay_ms", "retries will not back off");
        }
    }

    fn validate_backends(config: &Config, result: &mut ValidationResult) {
        for (id, backend) in &config.backends {
            if backend.model.trim().is_empty() {
                result.add_error(&format!("backends.{}.model", id), "model is required");
            }
        }
    }

    fn validate_storage(config: &Config, result: &mut ValidationResult) {
        let storage = &config.storage;
        let missing_path = storage.path.as_deref().is_none_or(|p| p.trim().is_empty());
        if storage.backend == StorageBackend::File && missing_path {
            result.add_error("storage.path", "file storage requires a path");
        }
        if storage.backend == StorageBackend::Memory && storage.path.is_some() {
            result.add_warning("storage.path", "ignored by memory storage");
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            result.add_warning(
                "logging.level",
                &format!("unknown level '{}', falling back to info", config.logging.level),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BackendConfig, BackendKindConfig};

    #[test]
    fn test_default_config_is_valid() {
        let result = ConfigValidator::validate(&Config::default());
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_zero_timeout_is_error() {
        let mut config = Config::default();
        config.engine.timeout_seconds = 0;
        let result = ConfigValidator::validate(&config);
        assert!(!result.is_valid());
        assert_eq!(result.errors[0].path, "engine.timeout_seconds");
    }

    #[test]
    fn test_zero_adapter_attempts_is_error() {
        let mut config = Config::default();
        config.engine.adapter_retry_attempts = 0;
        assert!(!ConfigValidator::validate(&config).is_valid());
    }

    #[test]
    fn test_zero_base_delay_is_warning() {
        let mut config = Config::default();
        config.engine.retry_base_delay_ms = 0;
        let result = ConfigValidator::validate(&config);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_empty_backend_model_is_error() {
        let mut config = Config::default();
        config.backends.insert(
            "local".into(),
            BackendConfig {
                kind: BackendKindConfig::LocalDaemon,
                model: "  ".into(),
                readiness: None,
                base_url: None,
            },
        );
        let result = ConfigValidator::validate(&config);
        assert_eq!(result.errors[0].path, "backends.local.model");
    }

    #[test]
    fn test_file_storage_requires_path() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::File;
        assert!(!ConfigValidator::validate(&config).is_valid());

        config.storage.path = Some("~/.flowpilot".into());
        assert!(ConfigValidator::validate(&config).is_valid());
    }

    #[test]
    fn test_unknown_log_level_is_warning() {
        let mut config = Config::default();
        config.logging.level = "loud".into();
        let result = ConfigValidator::validate(&config);
        assert!(result.is_valid());
        assert!(result.warnings[0].message.contains("loud"));
    }

    #[test]
    fn test_into_result_surfaces_first_error() {
        let mut config = Config::default();
        config.engine.timeout_seconds = 0;
        let err = ConfigValidator::validate(&config).into_result().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "engine.timeout_seconds"
        ));
    }
}
