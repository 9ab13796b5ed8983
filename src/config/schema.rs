//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatcher.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the task dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Worker pool sizing, one entry per workload category.
    pub pools: PoolsConfig,

    /// Per-category deadlines.
    pub timeouts: TimeoutConfig,

    /// Circuit breaker defaults.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Backpressure pipeline settings.
    pub backpressure: BackpressureConfig,

    /// Memory budget for memory-managed execution.
    pub memory: MemoryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Sizing for the four worker pools.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolsConfig {
    pub generic: PoolConfig,
    pub audio: PoolConfig,
    pub transcription: PoolConfig,
    pub ai: PoolConfig,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            generic: PoolConfig::new(8, 256),
            audio: PoolConfig::new(2, 32),
            transcription: PoolConfig::new(4, 64),
            ai: PoolConfig::new(2, 32),
        }
    }
}

/// Sizing for a single worker pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Maximum computations running at once.
    pub max_concurrency: usize,

    /// Maximum computations admitted (running + waiting).
    pub queue_capacity: usize,
}

impl PoolConfig {
    pub fn new(max_concurrency: usize, queue_capacity: usize) -> Self {
        Self { max_concurrency, queue_capacity }
    }
}

/// Deadlines for category calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Audio extraction deadline in seconds.
    pub audio_secs: u64,

    /// Transcription deadline in seconds.
    pub transcription_secs: u64,

    /// AI processing deadline per attempt in seconds.
    pub ai_secs: u64,

    /// Retries for AI processing after the first attempt.
    pub ai_max_retries: u32,
}

impl TimeoutConfig {
    pub fn audio(&self) -> Duration {
        Duration::from_secs(self.audio_secs)
    }

    pub fn transcription(&self) -> Duration {
        Duration::from_secs(self.transcription_secs)
    }

    pub fn ai(&self) -> Duration {
        Duration::from_secs(self.ai_secs)
    }

    /// First attempt plus `ai_max_retries`.
    pub fn ai_attempts(&self) -> u32 {
        self.ai_max_retries.saturating_add(1)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            audio_secs: 300,
            transcription_secs: 600,
            ai_secs: 900,
            ai_max_retries: 3,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Guard category calls with a per-category breaker.
    pub enabled: bool,

    /// Consecutive terminal failures before opening.
    pub failure_threshold: u32,

    /// Time spent open before a probe is allowed, in seconds.
    pub recovery_timeout_secs: u64,

    /// Deadline per attempt for explicitly guarded calls, in seconds.
    pub call_timeout_secs: u64,

    /// Attempts per explicitly guarded call.
    pub max_attempts: u32,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            call_timeout_secs: 60,
            max_attempts: 1,
        }
    }
}

/// Backpressure pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackpressureConfig {
    /// Pending items (buffered + in flight) before overflow.
    pub buffer_capacity: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self { buffer_capacity: 256 }
    }
}

/// Memory budget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Total megabytes that memory-managed computations may reserve.
    pub budget_mb: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { budget_mb: 2048 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DispatcherConfig = toml::from_str(
            r#"
            [pools.ai]
            max_concurrency = 1
            queue_capacity = 4

            [timeouts]
            ai_max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.pools.ai.max_concurrency, 1);
        assert_eq!(config.pools.generic.max_concurrency, 8);
        assert_eq!(config.timeouts.ai_max_retries, 5);
        assert_eq!(TimeoutConfig::default().ai_attempts(), 4);
        assert_eq!(config.timeouts.audio(), Duration::from_secs(300));
        assert_eq!(config.timeouts.transcription(), Duration::from_secs(600));
        assert_eq!(config.timeouts.ai(), Duration::from_secs(900));
    }
}
