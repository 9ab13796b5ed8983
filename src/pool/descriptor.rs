//! Pool identity and sizing.

use std::fmt;
use serde::Serialize;

use crate::config::{PoolConfig, PoolsConfig};
use crate::types::{DispatchError, DispatchResult};

/// Workload category; each category owns one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Generic,
    Audio,
    Transcription,
    Ai,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 4] = [
        WorkloadKind::Generic,
        WorkloadKind::Audio,
        WorkloadKind::Transcription,
        WorkloadKind::Ai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Generic => "generic",
            WorkloadKind::Audio => "audio",
            WorkloadKind::Transcription => "transcription",
            WorkloadKind::Ai => "ai",
        }
    }

    /// Sizing entry for this category.
    pub fn config<'a>(&self, pools: &'a PoolsConfig) -> &'a PoolConfig {
        match self {
            WorkloadKind::Generic => &pools.generic,
            WorkloadKind::Audio => &pools.audio,
            WorkloadKind::Transcription => &pools.transcription,
            WorkloadKind::Ai => &pools.ai,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable sizing for a single pool.
///
/// Invariant: `queue_capacity >= max_concurrency >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolDescriptor {
    pub name: String,
    pub max_concurrency: usize,
    pub queue_capacity: usize,
}

impl PoolDescriptor {
    pub fn new(name: impl Into<String>, max_concurrency: usize, queue_capacity: usize) -> DispatchResult<Self> {
        let name = name.into();
        if max_concurrency == 0 {
            return Err(DispatchError::InvalidConfig(format!(
                "pool '{}': max_concurrency must be at least 1",
                name
            )));
        }
        if queue_capacity < max_concurrency {
            return Err(DispatchError::InvalidConfig(format!(
                "pool '{}': queue_capacity {} is smaller than max_concurrency {}",
                name, queue_capacity, max_concurrency
            )));
        }
        Ok(Self { name, max_concurrency, queue_capacity })
    }

    pub fn from_config(kind: WorkloadKind, config: &PoolConfig) -> DispatchResult<Self> {
        Self::new(kind.as_str(), config.max_concurrency, config.queue_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_invariant() {
        assert!(PoolDescriptor::new("p", 1, 1).is_ok());
        assert!(PoolDescriptor::new("p", 4, 16).is_ok());
        assert!(matches!(PoolDescriptor::new("p", 0, 4), Err(DispatchError::InvalidConfig(_))));
        assert!(matches!(PoolDescriptor::new("p", 4, 2), Err(DispatchError::InvalidConfig(_))));
    }

    #[test]
    fn test_kind_maps_to_config() {
        let pools = PoolsConfig::default();
        let ai = PoolDescriptor::from_config(WorkloadKind::Ai, WorkloadKind::Ai.config(&pools)).unwrap();
        assert_eq!(ai.name, "ai");
        assert_eq!(ai.max_concurrency, pools.ai.max_concurrency);
    }
}
