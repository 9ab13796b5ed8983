//! Shared result types and error definitions.

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by user computations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while dispatching work.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Pool admission queue is full; the caller should back off.
    #[error("Pool '{pool}' saturated ({capacity} pending)")]
    PoolSaturated { pool: String, capacity: usize },

    /// Pool is draining and no longer admits work.
    #[error("Pool '{pool}' is closed")]
    PoolClosed { pool: String },

    /// Deadline exceeded while waiting for a result.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Circuit breaker is open for this operation class.
    #[error("Circuit open for operation '{operation}'")]
    CircuitOpen { operation: String },

    /// Memory reservation could not be granted.
    #[error("Insufficient memory: requested {requested_mb} MB, {available_mb} MB available")]
    InsufficientMemory { requested_mb: u32, available_mb: u32 },

    /// Item discarded by a full backpressure buffer.
    #[error("Item dropped by backpressure buffer (capacity {capacity})")]
    BackpressureDropped { capacity: usize },

    /// Resource release action failed.
    #[error("Resource cleanup failed: {0}")]
    ResourceCleanupFailed(String),

    /// Resource could not be acquired.
    #[error("Resource acquisition failed: {0}")]
    ResourceAcquisition(#[source] BoxError),

    /// The computation itself returned an error.
    #[error("Task failed: {0}")]
    Failed(#[source] BoxError),

    /// The computation panicked.
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// Rejected before any dispatch because of bad parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DispatchError {
    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DispatchError::Timeout(_) | DispatchError::Failed(_) | DispatchError::PoolSaturated { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DispatchError::Timeout(_))
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Tagged result of a category call (audio, transcription, AI).
///
/// Keeps "timed out" distinguishable from a completed but empty value.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The computation finished and produced a value (possibly empty).
    Completed(T),
    /// Every attempt exceeded the category deadline.
    TimedOut,
    /// The call failed for any other reason.
    Failed(DispatchError),
}

impl<T> Outcome<T> {
    pub fn from_result(result: DispatchResult<T>) -> Self {
        match result {
            Ok(value) => Outcome::Completed(value),
            Err(e) if e.is_timeout() => Outcome::TimedOut,
            Err(e) => Outcome::Failed(e),
        }
    }

    /// Absent on timeout or failure.
    pub fn into_option(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::TimedOut | Outcome::Failed(_) => None,
        }
    }

    /// Strict variant that keeps the error.
    pub fn into_result(self, deadline: Duration) -> DispatchResult<T> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::TimedOut => Err(DispatchError::Timeout(deadline)),
            Outcome::Failed(e) => Err(e),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Outcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DispatchError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(DispatchError::Failed("boom".into()).is_transient());
        assert!(!DispatchError::CircuitOpen { operation: "ai".into() }.is_transient());
        assert!(!DispatchError::InvalidConfig("x".into()).is_transient());
    }

    #[test]
    fn test_outcome_tags() {
        let timed_out: Outcome<Vec<u8>> =
            Outcome::from_result(Err(DispatchError::Timeout(Duration::from_secs(5))));
        assert!(timed_out.is_timed_out());
        assert!(timed_out.into_option().is_none());

        let empty: Outcome<Vec<u8>> = Outcome::from_result(Ok(Vec::new()));
        assert!(empty.is_completed());
        assert_eq!(empty.into_option(), Some(Vec::new()));

        let failed: Outcome<u32> = Outcome::from_result(Err(DispatchError::Failed("bad".into())));
        let err = failed.into_result(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DispatchError::Failed(_)));
    }
}
