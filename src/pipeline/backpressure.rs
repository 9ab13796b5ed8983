//! Bounded intake with an overflow policy.
//!
//! # Responsibilities
//! - Accept items while fewer than `capacity` are pending (buffered or in flight)
//! - Hand every rejected item to the overflow policy exactly once
//! - Drain the buffer with `max_concurrency` worker tasks
//!
//! # Design Decisions
//! - A single intake task is the only writer, so capacity accounting is exact
//! - A buffer slot is held until the item's processing finishes
//! - Dropped items never reach the processor

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{Stream, StreamExt};
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;
use crate::pipeline::{lazy_receiver_stream, process_item, ResultStream};
use crate::pool::WorkerPool;
use crate::types::{BoxError, DispatchError, DispatchResult};

/// What happens to an item that arrives while the buffer is full.
pub enum OverflowPolicy<T> {
    /// Log a warning and discard the item.
    LogAndDiscard,
    /// Hand the item to a callback.
    Notify(Arc<dyn Fn(T) + Send + Sync>),
}

impl<T> OverflowPolicy<T> {
    pub fn notify(callback: impl Fn(T) + Send + Sync + 'static) -> Self {
        OverflowPolicy::Notify(Arc::new(callback))
    }

    fn on_overflow(&self, item: T, capacity: usize) {
        metrics::record_backpressure_dropped();
        let reason = DispatchError::BackpressureDropped { capacity };
        match self {
            OverflowPolicy::LogAndDiscard => {
                tracing::warn!(error = %reason, "Discarding item");
            }
            OverflowPolicy::Notify(callback) => {
                tracing::debug!(error = %reason, "Item dropped, notifying");
                callback(item);
            }
        }
    }
}

impl<T> Clone for OverflowPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            OverflowPolicy::LogAndDiscard => OverflowPolicy::LogAndDiscard,
            OverflowPolicy::Notify(callback) => OverflowPolicy::Notify(callback.clone()),
        }
    }
}

impl<T> Default for OverflowPolicy<T> {
    fn default() -> Self {
        OverflowPolicy::LogAndDiscard
    }
}

impl<T> std::fmt::Debug for OverflowPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowPolicy::LogAndDiscard => f.write_str("LogAndDiscard"),
            OverflowPolicy::Notify(_) => f.write_str("Notify(..)"),
        }
    }
}

/// Buffered fan-out onto a worker pool.
#[derive(Debug, Clone)]
pub struct BackpressurePipeline {
    pool: Arc<WorkerPool>,
    capacity: usize,
}

impl BackpressurePipeline {
    pub fn new(pool: Arc<WorkerPool>, capacity: usize) -> DispatchResult<Self> {
        if capacity == 0 {
            return Err(DispatchError::InvalidConfig("buffer capacity must be at least 1".into()));
        }
        Ok(Self { pool, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Process `items` with at most `max_concurrency` in flight.
    ///
    /// The returned stream yields one entry per accepted item, in completion order.
    pub fn process<T, R, P, Fut, S>(
        &self,
        items: S,
        processor: P,
        max_concurrency: usize,
        overflow: OverflowPolicy<T>,
    ) -> DispatchResult<ResultStream<R>>
    where
        S: Stream<Item = T> + Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
        P: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    {
        if max_concurrency == 0 {
            return Err(DispatchError::InvalidConfig("max_concurrency must be at least 1".into()));
        }

        let pool = self.pool.clone();
        let capacity = self.capacity;
        let processor = Arc::new(processor);

        Ok(lazy_receiver_stream(move || {
            let (buffer_tx, buffer_rx) = mpsc::channel::<(T, OwnedSemaphorePermit)>(capacity);
            let (out_tx, out_rx) = mpsc::channel(max_concurrency);
            let slots = Arc::new(Semaphore::new(capacity));

            tokio::spawn(async move {
                let mut items = Box::pin(items);
                while let Some(item) = items.next().await {
                    if buffer_tx.is_closed() {
                        break;
                    }
                    match slots.clone().try_acquire_owned() {
                        Ok(permit) => {
                            if buffer_tx.send((item, permit)).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => overflow.on_overflow(item, capacity),
                    }
                }
            });

            let buffer_rx = Arc::new(Mutex::new(buffer_rx));
            for _ in 0..max_concurrency {
                let buffer_rx = buffer_rx.clone();
                let out_tx = out_tx.clone();
                let pool = pool.clone();
                let processor = processor.clone();

                tokio::spawn(async move {
                    loop {
                        let next = buffer_rx.lock().await.recv().await;
                        let Some((item, permit)) = next else { break };

                        let result = process_item(&pool, &processor, item).await;
                        drop(permit);
                        if out_tx.send(result).await.is_err() {
                            break;
                        }
                    }
                });
            }

            out_rx
        }))
    }
}
