//! Unbounded fan-out of independent computations.

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::pipeline::ResultStream;
use crate::pool::WorkerPool;
use crate::types::BoxError;

/// Submit every computation to `pool`; yields one result per input in completion order.
pub fn fan_out<F, Fut, T>(pool: Arc<WorkerPool>, works: Vec<F>) -> ResultStream<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    T: Send + 'static,
{
    let width = works.len().max(1);
    stream::iter(works)
        .map(move |work| {
            let submitted = pool.submit(work);
            async move {
                match submitted {
                    Ok(handle) => handle.await,
                    Err(e) => Err(e),
                }
            }
        })
        .buffer_unordered(width)
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolDescriptor;
    use crate::types::DispatchError;

    #[tokio::test]
    async fn test_one_result_per_input() {
        let pool = Arc::new(WorkerPool::new(PoolDescriptor::new("par", 2, 3).unwrap()));
        let works: Vec<_> = (0..5u32)
            .map(|n| {
                move || async move {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    Ok::<_, BoxError>(n)
                }
            })
            .collect();

        let results: Vec<_> = fan_out(pool, works).collect().await;
        assert_eq!(results.len(), 5);
        let saturated = results
            .iter()
            .filter(|r| matches!(r, Err(DispatchError::PoolSaturated { .. })))
            .count();
        assert_eq!(saturated, 2);
    }
}
