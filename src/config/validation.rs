//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacities, thresholds, delays > 0)
//! - Check that referenced ids are non-empty
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RefinerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::RefinerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("retries.base_delay_ms ({base}) exceeds retries.max_delay_ms ({max})")]
    DelayOrder { base: u64, max: u64 },

    #[error("observability.log_level '{0}' is not one of trace, debug, info, warn, error")]
    LogLevel(String),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &RefinerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backend.active.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "backend.active" });
    }
    if config.backend.fallback.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "backend.fallback" });
    }
    if config.cache.max_entries == 0 {
        errors.push(ValidationError::Zero { field: "cache.max_entries" });
    }
    if config.cache.ttl_secs == 0 {
        errors.push(ValidationError::Zero { field: "cache.ttl_secs" });
    }
    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::Zero { field: "circuit_breaker.failure_threshold" });
    }
    if config.circuit_breaker.max_half_open_probes == 0 {
        errors.push(ValidationError::Zero { field: "circuit_breaker.max_half_open_probes" });
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::DelayOrder {
            base: config.retries.base_delay_ms,
            max: config.retries.max_delay_ms,
        });
    }
    if config.retries.retryable_patterns.iter().all(|p| p.trim().is_empty()) {
        errors.push(ValidationError::Empty { field: "retries.retryable_patterns" });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    }
    if config.input.max_length == 0 {
        errors.push(ValidationError::Zero { field: "input.max_length" });
    }
    if config.templates.default.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "templates.default" });
    }
    if !matches!(
        config.observability.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
