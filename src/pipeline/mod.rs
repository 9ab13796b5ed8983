//! Lazy processing pipelines.
//!
//! # Data Flow
//! ```text
//! item stream
//!     → backpressure.rs (bounded buffer, overflow policy, fixed worker set)
//!     → batch.rs (ordered groups, per-group concurrency cap)
//!     → rate_limit.rs (fixed dispatch interval)
//!     → parallel.rs (one task per computation)
//!     → worker pool
//!     → result stream (mpsc-backed)
//! ```
//!
//! # Design Decisions
//! - Nothing is dispatched until the returned stream is first polled
//! - Each call builds its own channels; no pipeline state is shared
//! - A failed item becomes an `Err` entry; siblings keep running
//! - Dropping the result stream stops further dispatch

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::pool::WorkerPool;
use crate::types::{BoxError, DispatchResult};

pub mod backpressure;
pub mod batch;
pub mod parallel;
pub mod rate_limit;

pub use backpressure::{BackpressurePipeline, OverflowPolicy};
pub use batch::batch;
pub use parallel::fan_out;
pub use rate_limit::{pace, RateSchedule};

/// Stream of per-item results.
pub type ResultStream<R> = BoxStream<'static, DispatchResult<R>>;

enum Lazy<S, R> {
    Idle(S),
    Running(mpsc::Receiver<R>),
}

/// Defer `start` until first poll, then yield everything it sends.
pub(crate) fn lazy_receiver_stream<S, R>(start: S) -> BoxStream<'static, R>
where
    S: FnOnce() -> mpsc::Receiver<R> + Send + 'static,
    R: Send + 'static,
{
    stream::unfold(Lazy::Idle(start), |state| async move {
        let mut rx = match state {
            Lazy::Idle(start) => start(),
            Lazy::Running(rx) => rx,
        };
        rx.recv().await.map(|item| (item, Lazy::Running(rx)))
    })
    .boxed()
}

/// Run one item through `processor` on `pool`.
pub(crate) async fn process_item<T, R, P, Fut>(pool: &WorkerPool, processor: &Arc<P>, item: T) -> DispatchResult<R>
where
    P: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
{
    let processor = processor.clone();
    match pool.submit(move || processor(item)) {
        Ok(handle) => handle.await,
        Err(e) => Err(e),
    }
}
