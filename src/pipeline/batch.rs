//! Grouped processing.
//!
//! Input is cut into ordered, non-overlapping groups of at most `batch_size`.
//! Every group is dispatched at once; inside a group at most `concurrency`
//! items are in flight. Results arrive in completion order, one per input item.

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::pipeline::{lazy_receiver_stream, process_item, ResultStream};
use crate::pool::WorkerPool;
use crate::types::{BoxError, DispatchError, DispatchResult};

/// Process `items` in groups of `batch_size` with `concurrency` in flight per group.
pub fn batch<I, T, R, P, Fut>(
    pool: Arc<WorkerPool>,
    items: I,
    processor: P,
    batch_size: usize,
    concurrency: usize,
) -> DispatchResult<ResultStream<R>>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
    P: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
{
    if batch_size == 0 {
        return Err(DispatchError::InvalidConfig("batch_size must be at least 1".into()));
    }
    if concurrency == 0 {
        return Err(DispatchError::InvalidConfig("concurrency must be at least 1".into()));
    }

    let items = items.into_iter();
    let processor = Arc::new(processor);

    Ok(lazy_receiver_stream(move || {
        let (out_tx, out_rx) = mpsc::channel(batch_size);
        let mut groups = 0usize;

        let mut items = items.peekable();
        while items.peek().is_some() {
            let group: Vec<T> = items.by_ref().take(batch_size).collect();
            groups += 1;

            let out_tx = out_tx.clone();
            let pool = pool.clone();
            let processor = processor.clone();
            tokio::spawn(async move {
                let mut results = stream::iter(group)
                    .map(|item| {
                        let pool = pool.clone();
                        let processor = processor.clone();
                        async move { process_item(&pool, &processor, item).await }
                    })
                    .buffer_unordered(concurrency);

                while let Some(result) = results.next().await {
                    if out_tx.send(result).await.is_err() {
                        break;
                    }
                }
            });
        }

        tracing::debug!(groups, batch_size, concurrency, "Batches dispatched");
        out_rx
    }))
}
