//! Bounded worker pool.
//!
//! # Responsibilities
//! - Admit work up to `queue_capacity` pending computations
//! - Run at most `max_concurrency` computations at once
//! - Hand back a `TaskHandle` immediately on admission
//!
//! # Design Decisions
//! - Admission is a lock-free CAS on the pending counter; the RAII slot
//!   guard gives the slot back on every exit path, panics included
//! - Execution slots are semaphore permits held for the computation's duration
//! - Dropping a `TaskHandle` detaches the task, it never cancels it

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;
use uuid::Uuid;

use crate::observability::metrics;
use crate::pool::descriptor::PoolDescriptor;
use crate::types::{BoxError, DispatchError, DispatchResult};

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub max_concurrency: usize,
    pub queue_capacity: usize,
    /// Computations currently holding an execution slot.
    pub active: usize,
    /// Admitted computations, running or waiting.
    pub pending: usize,
}

/// A bounded pool of execution slots for one workload category.
#[derive(Debug)]
pub struct WorkerPool {
    descriptor: Arc<PoolDescriptor>,
    semaphore: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    running: AtomicBool,
}

impl WorkerPool {
    pub fn new(descriptor: PoolDescriptor) -> Self {
        tracing::info!(
            pool = %descriptor.name,
            max_concurrency = descriptor.max_concurrency,
            queue_capacity = descriptor.queue_capacity,
            "Starting worker pool"
        );

        Self {
            semaphore: Arc::new(Semaphore::new(descriptor.max_concurrency)),
            descriptor: Arc::new(descriptor),
            pending: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            running: AtomicBool::new(true),
        }
    }

    pub fn descriptor(&self) -> &PoolDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Submit an async computation.
    ///
    /// Fails with `PoolSaturated` when `queue_capacity` computations are already pending.
    pub fn submit<F, Fut, T>(&self, work: F) -> DispatchResult<TaskHandle<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        let slot = self.admit()?;
        Ok(self.spawn(slot, async move { work().await.map_err(DispatchError::Failed) }))
    }

    /// Submit a synchronous, CPU-bound computation.
    ///
    /// Runs on the blocking thread pool while holding one of this pool's slots.
    pub fn submit_blocking<F, T>(&self, work: F) -> DispatchResult<TaskHandle<T>>
    where
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
        T: Send + 'static,
    {
        let slot = self.admit()?;
        Ok(self.spawn(slot, async move {
            let span = tracing::Span::current();
            match tokio::task::spawn_blocking(move || span.in_scope(work)).await {
                Ok(result) => result.map_err(DispatchError::Failed),
                Err(e) => Err(join_error(e)),
            }
        }))
    }

    /// Reserve a pending slot or reject.
    fn admit(&self) -> DispatchResult<SlotGuard> {
        if !self.running.load(Ordering::SeqCst) {
            metrics::record_task_rejected(&self.descriptor.name, "closed");
            return Err(DispatchError::PoolClosed { pool: self.descriptor.name.clone() });
        }

        let capacity = self.descriptor.queue_capacity;
        let mut prev = self.pending.load(Ordering::Relaxed);
        loop {
            if prev >= capacity {
                tracing::debug!(
                    pool = %self.descriptor.name,
                    pending = prev,
                    capacity = capacity,
                    "Pool at capacity, rejecting"
                );
                metrics::record_task_rejected(&self.descriptor.name, "saturated");
                return Err(DispatchError::PoolSaturated {
                    pool: self.descriptor.name.clone(),
                    capacity,
                });
            }
            match self.pending.compare_exchange_weak(
                prev, prev + 1, Ordering::AcqRel, Ordering::Relaxed
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }

        metrics::record_task_submitted(&self.descriptor.name);
        Ok(SlotGuard { pending: self.pending.clone() })
    }

    fn spawn<T, Fut>(&self, slot: SlotGuard, body: Fut) -> TaskHandle<T>
    where
        Fut: Future<Output = DispatchResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let task_id = Uuid::new_v4();
        let span = tracing::info_span!("task", pool = %self.descriptor.name, %task_id);
        let semaphore = self.semaphore.clone();
        let active = self.active.clone();
        let descriptor = self.descriptor.clone();

        let inner = tokio::spawn(
            async move {
                let _slot = slot;
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| DispatchError::PoolClosed { pool: descriptor.name.clone() })?;
                let _active = ActiveGuard::enter(active, descriptor.clone());

                let start = Instant::now();
                let result = body.await;
                let status = if result.is_ok() { "success" } else { "error" };
                metrics::record_task_completed(&descriptor.name, status, start.elapsed());
                tracing::trace!(status, elapsed_ms = start.elapsed().as_millis() as u64, "Task finished");
                result
            }
            .instrument(span),
        );

        TaskHandle { task_id, inner }
    }

    /// Stop admitting new work; in-flight work runs to completion.
    pub fn drain(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!(pool = %self.descriptor.name, "Draining pool");
        }
    }

    /// True once draining has started and nothing is pending.
    pub fn is_drained(&self) -> bool {
        !self.running.load(Ordering::SeqCst) && self.pending.load(Ordering::SeqCst) == 0
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            name: self.descriptor.name.clone(),
            max_concurrency: self.descriptor.max_concurrency,
            queue_capacity: self.descriptor.queue_capacity,
            active: self.active.load(Ordering::SeqCst),
            pending: self.pending.load(Ordering::SeqCst),
        }
    }
}

/// Holds one admission slot; released on drop.
#[derive(Debug)]
struct SlotGuard {
    pending: Arc<AtomicUsize>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Tracks a computation holding an execution slot.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
    descriptor: Arc<PoolDescriptor>,
}

impl ActiveGuard {
    fn enter(active: Arc<AtomicUsize>, descriptor: Arc<PoolDescriptor>) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_pool_active(&descriptor.name, now);
        Self { active, descriptor }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let now = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_pool_active(&self.descriptor.name, now);
    }
}

/// Future resolving to the result of a submitted computation.
#[derive(Debug)]
pub struct TaskHandle<T> {
    task_id: Uuid,
    inner: JoinHandle<DispatchResult<T>>,
}

impl<T> TaskHandle<T> {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = DispatchResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => Poll::Ready(Err(join_error(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn join_error(e: JoinError) -> DispatchError {
    if e.is_panic() {
        let payload = e.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        DispatchError::Panicked(message)
    } else {
        DispatchError::Panicked("task cancelled".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn pool(max: usize, cap: usize) -> WorkerPool {
        WorkerPool::new(PoolDescriptor::new("test", max, cap).unwrap())
    }

    #[tokio::test]
    async fn test_submit_returns_result() {
        let pool = pool(2, 4);
        let handle = pool.submit(|| async { Ok::<_, BoxError>(21 * 2) }).unwrap();
        assert_eq!(handle.await.unwrap(), 42);
        assert_eq!(pool.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_saturation_rejects_beyond_capacity() {
        let pool = pool(1, 2);
        let (tx, rx) = oneshot::channel::<()>();
        let rx = Arc::new(tokio::sync::Mutex::new(Some(rx)));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let rx = rx.clone();
            handles.push(pool.submit(move || async move {
                if let Some(rx) = rx.lock().await.take() {
                    let _ = rx.await;
                }
                Ok::<_, BoxError>(())
            }).unwrap());
        }

        let err = pool.submit(|| async { Ok::<_, BoxError>(()) }).unwrap_err();
        assert!(matches!(err, DispatchError::PoolSaturated { capacity: 2, .. }));

        tx.send(()).unwrap();
        for h in handles {
            h.await.unwrap();
        }
        assert!(pool.submit(|| async { Ok::<_, BoxError>(()) }).is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_capped() {
        let pool = pool(2, 10);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                pool.submit(move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                })
                .unwrap()
            })
            .collect();

        for h in handles {
            h.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_and_panic_release_slots() {
        let pool = pool(1, 1);

        let err = pool
            .submit(|| async { Err::<(), BoxError>("boom".into()) })
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Failed(_)));

        let err = pool
            .submit_blocking(|| -> Result<(), BoxError> { panic!("exploded") })
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Panicked(ref m) if m.contains("exploded")));

        assert_eq!(pool.stats().pending, 0);
        assert_eq!(pool.submit_blocking(|| Ok::<_, BoxError>(7)).unwrap().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_drain_rejects_new_work() {
        let pool = pool(1, 1);
        pool.drain();
        assert!(pool.is_drained());
        let err = pool.submit(|| async { Ok::<_, BoxError>(()) }).unwrap_err();
        assert!(matches!(err, DispatchError::PoolClosed { .. }));
    }
}
