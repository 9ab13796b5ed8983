//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - A deadline stops the caller from waiting; it does not stop the work.
//!   A computation already running on a pool keeps its slot until it
//!   finishes on its own, so a timed-out result is observed at most once
//!   but the work may still execute to completion.

use std::future::Future;
use std::time::Duration;

use crate::types::{DispatchError, DispatchResult};

/// Wait for `fut` for at most `deadline`.
pub async fn with_deadline<T, Fut>(deadline: Duration, fut: Fut) -> DispatchResult<T>
where
    Fut: Future<Output = DispatchResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{PoolDescriptor, WorkerPool};
    use crate::types::BoxError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let result: DispatchResult<()> = with_deadline(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(DispatchError::Timeout(d)) if d == Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_work_keeps_running() {
        let pool = WorkerPool::new(PoolDescriptor::new("t", 1, 1).unwrap());
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let handle = pool
            .submit(move || async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            })
            .unwrap();

        let result = with_deadline(Duration::from_millis(10), handle).await;
        assert!(matches!(result, Err(DispatchError::Timeout(_))));
        assert_eq!(pool.stats().pending, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(pool.stats().pending, 0);
    }
}
