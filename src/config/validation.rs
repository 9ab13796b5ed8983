//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate pool sizing (queue_capacity >= max_concurrency >= 1)
//! - Validate value ranges (timeouts > 0, breaker attempts >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatcherConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{DispatcherConfig, PoolConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &DispatcherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, pool) in [
        ("generic", &config.pools.generic),
        ("audio", &config.pools.audio),
        ("transcription", &config.pools.transcription),
        ("ai", &config.pools.ai),
    ] {
        validate_pool(name, pool, &mut errors);
    }

    let timeouts = &config.timeouts;
    for (field, secs) in [
        ("timeouts.audio_secs", timeouts.audio_secs),
        ("timeouts.transcription_secs", timeouts.transcription_secs),
        ("timeouts.ai_secs", timeouts.ai_secs),
        ("circuit_breaker.call_timeout_secs", config.circuit_breaker.call_timeout_secs),
    ] {
        if secs == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if cb.max_attempts == 0 {
        errors.push(ValidationError::new("circuit_breaker.max_attempts", "must be at least 1"));
    }

    if config.backpressure.buffer_capacity == 0 {
        errors.push(ValidationError::new("backpressure.buffer_capacity", "must be at least 1"));
    }
    if config.memory.budget_mb == 0 {
        errors.push(ValidationError::new("memory.budget_mb", "must be at least 1"));
    }

    let obs = &config.observability;
    if !matches!(obs.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}' (expected pretty or json)", obs.log_format),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_pool(name: &str, pool: &PoolConfig, errors: &mut Vec<ValidationError>) {
    if pool.max_concurrency == 0 {
        errors.push(ValidationError::new(
            format!("pools.{}.max_concurrency", name),
            "must be at least 1",
        ));
    }
    if pool.queue_capacity < pool.max_concurrency {
        errors.push(ValidationError::new(
            format!("pools.{}.queue_capacity", name),
            format!(
                "{} is smaller than max_concurrency {}",
                pool.queue_capacity, pool.max_concurrency
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&DispatcherConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = DispatcherConfig::default();
        config.pools.audio = PoolConfig::new(0, 0);
        config.pools.ai = PoolConfig::new(4, 2);
        config.timeouts.ai_secs = 0;
        config.observability.log_format = "xml".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"pools.audio.max_concurrency"));
        assert!(fields.contains(&"pools.ai.queue_capacity"));
        assert!(fields.contains(&"timeouts.ai_secs"));
        assert!(fields.contains(&"observability.log_format"));
        assert!(!fields.contains(&"pools.audio.queue_capacity"));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = DispatcherConfig::default();
        config.observability.metrics_address = "not-an-address".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
