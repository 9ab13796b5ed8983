//! Retry logic.
//!
//! # Responsibilities
//! - Apply a deadline to every attempt
//! - Re-submit immediately on timeout or transient failure
//! - Return the last error once attempts are exhausted
//!
//! # Design Decisions
//! - No backoff: a failed attempt is re-submitted right away
//! - Only transient errors (timeout, computation error, saturation) are retried
//! - Timed-out attempts are abandoned, not cancelled (see timeouts.rs)

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;
use crate::pool::{TaskHandle, WorkerPool};
use crate::resilience::timeouts::with_deadline;
use crate::types::{BoxError, DispatchResult};

/// Deadline and attempt budget for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub deadline: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(deadline: Duration, max_attempts: u32) -> Self {
        Self { deadline, max_attempts: max_attempts.max(1) }
    }

    /// A single attempt with a deadline.
    pub fn once(deadline: Duration) -> Self {
        Self::new(deadline, 1)
    }

    /// Run a re-invocable computation on `pool` under this policy.
    pub async fn run<F, Fut, T>(&self, operation: &str, pool: &WorkerPool, work: Arc<F>) -> DispatchResult<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        self.run_attempts(operation, || {
            let work = work.clone();
            pool.submit(move || work())
        })
        .await
    }

    /// Drive attempts produced by `submit` until one succeeds or the budget runs out.
    pub async fn run_attempts<T, S>(&self, operation: &str, mut submit: S) -> DispatchResult<T>
    where
        S: FnMut() -> DispatchResult<TaskHandle<T>>,
    {
        let mut attempt = 1;
        loop {
            let result = match submit() {
                Ok(handle) => with_deadline(self.deadline, handle).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if e.is_timeout() {
                        metrics::record_timeout(operation);
                    }
                    if !e.is_transient() || attempt >= self.max_attempts {
                        if attempt > 1 {
                            tracing::warn!(
                                operation,
                                attempts = attempt,
                                error = %e,
                                "Attempts exhausted"
                            );
                        }
                        return Err(e);
                    }
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolDescriptor;
    use crate::types::DispatchError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn pool() -> WorkerPool {
        WorkerPool::new(PoolDescriptor::new("retry", 2, 8).unwrap())
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let pool = pool();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let work = Arc::new(move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err::<u32, BoxError>("flaky".into())
                } else {
                    Ok(99)
                }
            }
        });

        let policy = RetryPolicy::new(Duration::from_secs(1), 3);
        assert_eq!(policy.run("test", &pool, work).await.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let pool = pool();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let work = Arc::new(move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), BoxError>(format!("failure {}", n).into()) }
        });

        let err = RetryPolicy::new(Duration::from_secs(1), 3)
            .run("test", &pool, work)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Failed(ref e) if e.to_string() == "failure 2"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried_per_attempt() {
        let pool = pool();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let work = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, BoxError>(())
            }
        });

        let err = RetryPolicy::new(Duration::from_millis(100), 2)
            .run("slow", &pool, work)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let mut calls = 0;
        let err = RetryPolicy::new(Duration::from_secs(1), 5)
            .run_attempts::<(), _>("closed", || {
                calls += 1;
                Err(DispatchError::PoolClosed { pool: "p".into() })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::PoolClosed { .. }));
        assert_eq!(calls, 1);
    }
}
