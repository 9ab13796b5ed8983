//! Shared utilities for integration and load testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use task_dispatcher::config::{DispatcherConfig, PoolConfig};
use task_dispatcher::types::BoxError;
use task_dispatcher::Dispatcher;

/// Dispatcher with small pools so saturation is easy to reach.
pub fn small_dispatcher<F>(configure: F) -> Dispatcher
where
    F: FnOnce(&mut DispatcherConfig),
{
    let mut config = DispatcherConfig::default();
    config.pools.generic = PoolConfig::new(4, 64);
    config.pools.audio = PoolConfig::new(1, 4);
    config.pools.transcription = PoolConfig::new(2, 8);
    config.pools.ai = PoolConfig::new(4, 16);
    configure(&mut config);
    Dispatcher::new(config).unwrap()
}

/// Counts how often something happened.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU32>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Release action that counts invocations.
#[allow(dead_code)]
pub fn counting_release<R: 'static>(counter: &Counter) -> impl FnOnce(&mut R) -> Result<(), BoxError> + Send + 'static {
    let counter = counter.clone();
    move |_| {
        counter.hit();
        Ok(())
    }
}
