//! Dispatch pacing.
//!
//! Items are dispatched no closer together than `1000 / items_per_second` ms.
//! Only dispatch is paced; completions land whenever the pool finishes them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::pipeline::{lazy_receiver_stream, ResultStream};
use crate::pool::WorkerPool;
use crate::types::{BoxError, DispatchError, DispatchResult};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Fixed gap between dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSchedule {
    interval: Duration,
}

impl RateSchedule {
    /// Rejects a zero rate. Rates above 1000/s are clamped to a 1ms interval.
    pub fn per_second(items_per_second: u32) -> DispatchResult<Self> {
        if items_per_second == 0 {
            return Err(DispatchError::InvalidConfig("items_per_second must be greater than 0".into()));
        }
        let interval = (Duration::from_secs(1) / items_per_second).max(MIN_INTERVAL);
        Ok(Self { interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Dispatch each item to `pool` on the schedule's cadence.
pub fn pace<S, T, R, P, Fut>(
    pool: Arc<WorkerPool>,
    items: S,
    processor: P,
    schedule: RateSchedule,
) -> ResultStream<R>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
    P: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
{
    let processor = Arc::new(processor);

    lazy_receiver_stream(move || {
        let (out_tx, out_rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut ticker = time::interval(schedule.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut items = Box::pin(items);

            while let Some(item) = items.next().await {
                ticker.tick().await;
                if out_tx.is_closed() {
                    break;
                }

                let processor = processor.clone();
                match pool.submit(move || processor(item)) {
                    Ok(handle) => {
                        let out_tx = out_tx.clone();
                        tokio::spawn(async move {
                            let _ = out_tx.send(handle.await).await;
                        });
                    }
                    Err(e) => {
                        if out_tx.send(Err(e)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        out_rx
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolDescriptor;
    use futures_util::stream;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[test]
    fn test_schedule_interval() {
        assert_eq!(RateSchedule::per_second(4).unwrap().interval(), Duration::from_millis(250));
        assert_eq!(RateSchedule::per_second(5000).unwrap().interval(), Duration::from_millis(1));
        assert!(matches!(RateSchedule::per_second(0), Err(DispatchError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatches_are_spaced() {
        let pool = Arc::new(WorkerPool::new(PoolDescriptor::new("rate", 8, 64).unwrap()));
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let s = stamps.clone();

        let results: Vec<_> = pace(
            pool,
            stream::iter(0..12u32),
            move |n| {
                s.lock().unwrap().push(Instant::now());
                async move { Ok::<_, BoxError>(n) }
            },
            RateSchedule::per_second(20).unwrap(),
        )
        .collect()
        .await;
        assert_eq!(results.len(), 12);

        let mut stamps = stamps.lock().unwrap().clone();
        stamps.sort();
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(50));
        }
    }
}
