//! Shutdown coordination for the dispatcher.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::dispatch::Dispatcher;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Coordinator for graceful shutdown.
///
/// Background loops subscribe and exit when the signal fires.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Stop admission on every pool and wait up to `deadline` for pending work.
///
/// Returns true when every pool drained in time.
pub async fn drain_with_deadline(dispatcher: &Dispatcher, deadline: Duration) -> bool {
    dispatcher.drain();
    let started = Instant::now();

    while !dispatcher.is_drained() {
        if started.elapsed() >= deadline {
            for stats in dispatcher.pool_stats().into_iter().filter(|s| s.pending > 0) {
                tracing::warn!(
                    pool = %stats.name,
                    pending = stats.pending,
                    active = stats.active,
                    "Pool still busy at shutdown deadline"
                );
            }
            return false;
        }
        time::sleep(DRAIN_POLL_INTERVAL).await;
    }

    tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "All pools drained");
    true
}
