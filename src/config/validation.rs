//! Configuration validation
//!
//! Validates cache configuration for correctness:
//! - The database path is set and is not a directory
//! - The default TTL is non-zero
//! - The soft entry limit is non-zero

use super::cache_config::CacheConfig;
use crate::CacheError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a cache configuration
pub fn validate_config(config: &CacheConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.path.as_os_str().is_empty() {
        errors.push(ValidationError::new("path", "Database path cannot be empty"));
    } else if config.path.is_dir() {
        errors.push(ValidationError::new(
            "path",
            format!("Database path is a directory: {}", config.path.display()),
        ));
    }

    if config.default_ttl_secs == 0 {
        errors.push(ValidationError::new(
            "default_ttl_secs",
            "Default TTL must be greater than 0",
        ));
    }

    if config.max_entries == 0 {
        errors.push(ValidationError::new(
            "max_entries",
            "Maximum entries must be greater than 0",
        ));
    }

    if config.busy_timeout_ms == 0 {
        tracing::warn!("busy_timeout_ms is 0, concurrent writers will fail instead of waiting");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &CacheConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        CacheError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
