//! Unified entry point for background work.
//!
//! # Responsibilities
//! - Route each workload category to its pool
//! - Apply per-category deadlines, retries and circuit breakers
//! - Expose the pipeline, scoped-resource and memory-managed operations
//!
//! # Design Decisions
//! - Pools, breakers and the memory budget are passed in, never looked up globally
//! - Category calls return a tagged `Outcome`; `Outcome::into_option` gives the
//!   absent-on-timeout behaviour callers of the web layer rely on
//! - Everything else returns explicit `DispatchResult`s

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::Stream;

use crate::config::validation::validate_config;
use crate::config::DispatcherConfig;
use crate::pipeline::{self, BackpressurePipeline, OverflowPolicy, RateSchedule, ResultStream};
use crate::pool::{PoolSet, PoolStats, TaskHandle, WorkloadKind};
use crate::resilience::{BreakerSettings, CircuitBreakerRegistry, CircuitSnapshot, RetryPolicy};
use crate::resource::{MemoryBudget, ResourceHandle, ScopedExecutor};
use crate::types::{BoxError, DispatchError, DispatchResult, Outcome};

/// Dispatch facade over the four worker pools.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<DispatcherConfig>,
    pools: PoolSet,
    breakers: Arc<CircuitBreakerRegistry>,
    memory: MemoryBudget,
}

impl Dispatcher {
    /// Validate `config` and build pools, breakers and memory budget from it.
    pub fn new(config: DispatcherConfig) -> DispatchResult<Self> {
        validate_config(&config).map_err(|errors| {
            let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            DispatchError::InvalidConfig(joined.join(", "))
        })?;
        let pools = PoolSet::from_config(&config.pools)?;
        Ok(Self::with_pools(config, pools))
    }

    /// Build around existing pools.
    pub fn with_pools(config: DispatcherConfig, pools: PoolSet) -> Self {
        let memory = MemoryBudget::new(config.memory.budget_mb);
        Self {
            config: Arc::new(config),
            pools,
            breakers: Arc::new(CircuitBreakerRegistry::new()),
            memory,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn pools(&self) -> &PoolSet {
        &self.pools
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn memory(&self) -> &MemoryBudget {
        &self.memory
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.pools.stats()
    }

    pub fn circuit_snapshots(&self) -> Vec<CircuitSnapshot> {
        self.breakers.snapshots()
    }

    /// Stop admitting work on every pool.
    pub fn drain(&self) {
        self.pools.drain();
    }

    pub fn is_drained(&self) -> bool {
        self.pools.is_drained()
    }

    // --- Generic pool ---

    /// Run synchronous CPU-bound work on the generic pool.
    pub fn execute_cpu_intensive<F, T>(&self, work: F) -> DispatchResult<TaskHandle<T>>
    where
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
        T: Send + 'static,
    {
        self.pools.get(WorkloadKind::Generic).submit_blocking(work)
    }

    /// Run async I/O-bound work on the generic pool.
    pub fn execute_io_intensive<F, Fut, T>(&self, work: F) -> DispatchResult<TaskHandle<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        self.pools.get(WorkloadKind::Generic).submit(work)
    }

    // --- Category calls ---

    /// Audio extraction, single attempt, `timeouts.audio_secs` deadline.
    pub async fn execute_audio_processing<F, Fut, T>(&self, work: F) -> Outcome<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        let policy = RetryPolicy::once(self.config.timeouts.audio());
        self.run_category(WorkloadKind::Audio, policy, work).await
    }

    /// Transcription, single attempt, `timeouts.transcription_secs` deadline.
    pub async fn execute_transcription<F, Fut, T>(&self, work: F) -> Outcome<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        let policy = RetryPolicy::once(self.config.timeouts.transcription());
        self.run_category(WorkloadKind::Transcription, policy, work).await
    }

    /// AI processing, `timeouts.ai_secs` per attempt, retried `timeouts.ai_max_retries` times.
    pub async fn execute_ai_processing<F, Fut, T>(&self, work: F) -> Outcome<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        let timeouts = &self.config.timeouts;
        let policy = RetryPolicy::new(timeouts.ai(), timeouts.ai_attempts());
        self.run_category(WorkloadKind::Ai, policy, work).await
    }

    async fn run_category<F, Fut, T>(&self, kind: WorkloadKind, policy: RetryPolicy, work: F) -> Outcome<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        let operation = kind.as_str();
        let pool = self.pools.get(kind);
        let work = Arc::new(work);
        let attempt = || policy.run(operation, pool, work);

        let cb = &self.config.circuit_breaker;
        let result = if cb.enabled {
            let settings = BreakerSettings::new(cb.failure_threshold, cb.recovery_timeout());
            self.breakers.get_or_create(operation, settings).call(attempt).await
        } else {
            attempt().await
        };

        let outcome = Outcome::from_result(result);
        match &outcome {
            Outcome::TimedOut => tracing::warn!(
                pool = operation,
                deadline_secs = policy.deadline.as_secs(),
                attempts = policy.max_attempts,
                "Category call timed out, returning no result"
            ),
            Outcome::Failed(e) => tracing::warn!(pool = operation, error = %e, "Category call failed"),
            Outcome::Completed(_) => {}
        }
        outcome
    }

    // --- Guarded and decorated calls ---

    /// Run `work` on the generic pool behind the breaker for `operation`.
    ///
    /// The breaker is created on first use with these settings and persists across calls.
    pub async fn execute_with_circuit_breaker<F, Fut, T>(
        &self,
        operation: &str,
        failure_threshold: u32,
        recovery_timeout: Duration,
        work: F,
    ) -> DispatchResult<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        let settings = BreakerSettings::new(failure_threshold, recovery_timeout);
        let breaker = self.breakers.get_or_create(operation, settings);
        let cb = &self.config.circuit_breaker;
        let policy = RetryPolicy::new(cb.call_timeout(), cb.max_attempts);
        let pool = self.pools.get(WorkloadKind::Generic);
        let work = Arc::new(work);

        breaker.call(|| policy.run(operation, pool, work)).await
    }

    /// Reserve `ceiling_mb` from the memory budget, then run `work` on the generic pool.
    ///
    /// Fails with `InsufficientMemory` before dispatch when the reservation is refused.
    pub fn execute_with_memory_management<F, Fut, T>(&self, work: F, ceiling_mb: u32) -> DispatchResult<TaskHandle<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        let reservation = self.memory.try_reserve(ceiling_mb)?;
        self.pools.get(WorkloadKind::Generic).submit(move || async move {
            let _reservation = reservation;
            work().await
        })
    }

    /// Wait `delay`, then run `work` on the generic pool.
    pub async fn execute_with_delay<F, Fut, T>(&self, work: F, delay: Duration) -> DispatchResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::time::sleep(delay).await;
        self.pools.get(WorkloadKind::Generic).submit(work)?.await
    }

    /// Acquire a resource, run `use_fn` on the generic pool, release exactly once.
    pub async fn execute_with_resource<Res, T, A, AFut, U, UFut, Rel>(
        &self,
        acquire: A,
        use_fn: U,
        release: Rel,
    ) -> DispatchResult<T>
    where
        A: FnOnce() -> AFut,
        AFut: Future<Output = Result<Res, BoxError>>,
        U: FnOnce(ResourceHandle<Res>) -> UFut + Send + 'static,
        UFut: Future<Output = Result<T, BoxError>> + Send + 'static,
        Rel: FnOnce(&mut Res) -> Result<(), BoxError> + Send + 'static,
        Res: Send + 'static,
        T: Send + 'static,
    {
        ScopedExecutor::new(self.pools.get(WorkloadKind::Generic).clone())
            .run(acquire, use_fn, release)
            .await
    }

    /// Like `execute_with_resource`, but stop waiting after `deadline`.
    ///
    /// A timed-out call returns `Timeout` at once; the resource is released when the
    /// abandoned work finishes with it.
    pub async fn execute_with_resource_deadline<Res, T, A, AFut, U, UFut, Rel>(
        &self,
        acquire: A,
        use_fn: U,
        release: Rel,
        deadline: Duration,
    ) -> DispatchResult<T>
    where
        A: FnOnce() -> AFut,
        AFut: Future<Output = Result<Res, BoxError>>,
        U: FnOnce(ResourceHandle<Res>) -> UFut + Send + 'static,
        UFut: Future<Output = Result<T, BoxError>> + Send + 'static,
        Rel: FnOnce(&mut Res) -> Result<(), BoxError> + Send + 'static,
        Res: Send + 'static,
        T: Send + 'static,
    {
        ScopedExecutor::new(self.pools.get(WorkloadKind::Generic).clone())
            .with_deadline(deadline)
            .run(acquire, use_fn, release)
            .await
    }

    // --- Sequences ---

    /// Run every computation on the generic pool; one result per input.
    pub fn execute_parallel<F, Fut, T>(&self, works: Vec<F>) -> ResultStream<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Send + 'static,
    {
        pipeline::fan_out(self.pools.get(WorkloadKind::Generic).clone(), works)
    }

    /// Process `items` in groups of `batch_size`, `concurrency` in flight per group.
    ///
    /// Every group is dispatched at once, so up to `groups * concurrency` computations
    /// compete for the generic pool. Once that exceeds `pools.generic.queue_capacity`
    /// the surplus items come back as `PoolSaturated` entries; size `batch_size` and
    /// `concurrency` (or the pool) accordingly.
    pub fn batch_process<I, T, R, P, Fut>(
        &self,
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
        pipeline::batch(self.pools.get(WorkloadKind::Generic).clone(), items, processor, batch_size, concurrency)
    }

    /// Buffer `items` up to `backpressure.buffer_capacity`, logging and discarding overflow.
    pub fn process_with_backpressure<S, T, R, P, Fut>(
        &self,
        items: S,
        processor: P,
        max_concurrency: usize,
    ) -> DispatchResult<ResultStream<R>>
    where
        S: Stream<Item = T> + Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
        P: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    {
        self.process_with_overflow(items, processor, max_concurrency, OverflowPolicy::LogAndDiscard)
    }

    /// Like `process_with_backpressure` with an explicit overflow policy.
    pub fn process_with_overflow<S, T, R, P, Fut>(
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
        BackpressurePipeline::new(
            self.pools.get(WorkloadKind::Generic).clone(),
            self.config.backpressure.buffer_capacity,
        )?
        .process(items, processor, max_concurrency, overflow)
    }

    /// Dispatch `items` at most `items_per_second` per second.
    pub fn process_with_rate_limit<S, T, R, P, Fut>(
        &self,
        items: S,
        processor: P,
        items_per_second: u32,
    ) -> DispatchResult<ResultStream<R>>
    where
        S: Stream<Item = T> + Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
        P: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    {
        let schedule = RateSchedule::per_second(items_per_second)?;
        Ok(pipeline::pace(self.pools.get(WorkloadKind::Generic).clone(), items, processor, schedule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::resilience::CircuitState;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(DispatcherConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = DispatcherConfig::default();
        config.pools.audio = PoolConfig::new(3, 1);
        let err = Dispatcher::new(config).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig(ref m) if m.contains("pools.audio")));
    }

    #[tokio::test]
    async fn test_cpu_and_io_on_generic_pool() {
        let d = dispatcher();
        let cpu = d.execute_cpu_intensive(|| Ok::<_, BoxError>((1..=10u64).product::<u64>())).unwrap();
        let io = d.execute_io_intensive(|| async { Ok::<_, BoxError>("fetched") }).unwrap();
        assert_eq!(cpu.await.unwrap(), 3_628_800);
        assert_eq!(io.await.unwrap(), "fetched");
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_timeout_yields_no_result() {
        let d = dispatcher();
        let outcome = d
            .execute_audio_processing(|| async {
                tokio::time::sleep(Duration::from_secs(301)).await;
                Ok::<_, BoxError>(vec![0u8; 4])
            })
            .await;
        assert!(outcome.is_timed_out());
        assert!(outcome.into_option().is_none());
    }

    #[tokio::test]
    async fn test_empty_result_distinct_from_timeout() {
        let d = dispatcher();
        let outcome = d.execute_transcription(|| async { Ok::<_, BoxError>(String::new()) }).await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.into_option(), Some(String::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ai_retried_three_times_after_first_timeout() {
        let mut config = DispatcherConfig::default();
        config.pools.ai = PoolConfig::new(4, 8);
        let d = Dispatcher::new(config).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let outcome = d
            .execute_ai_processing(move || {
                c.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, BoxError>("summary")
                }
            })
            .await;
        assert!(outcome.is_timed_out());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_category_breaker_opens() {
        let mut config = DispatcherConfig::default();
        config.circuit_breaker.failure_threshold = 1;
        let d = Dispatcher::new(config).unwrap();

        let outcome = d.execute_transcription(|| async { Err::<(), BoxError>("provider down".into()) }).await;
        assert!(matches!(outcome, Outcome::Failed(DispatchError::Failed(_))));

        let outcome = d.execute_transcription(|| async { Ok::<_, BoxError>(()) }).await;
        assert!(matches!(outcome, Outcome::Failed(DispatchError::CircuitOpen { .. })));
        assert_eq!(d.breakers().get("transcription").unwrap().state(), CircuitState::Open);

        assert!(d.execute_audio_processing(|| async { Ok::<_, BoxError>(1) }).await.is_completed());
    }

    #[tokio::test]
    async fn test_memory_ceiling_fails_fast() {
        let mut config = DispatcherConfig::default();
        config.memory.budget_mb = 512;
        let d = Dispatcher::new(config).unwrap();
        let invoked = Arc::new(AtomicU32::new(0));

        let i = invoked.clone();
        let err = d
            .execute_with_memory_management(
                move || async move {
                    i.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                },
                1024,
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::InsufficientMemory { requested_mb: 1024, available_mb: 512 }));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        let handle = d.execute_with_memory_management(|| async { Ok::<_, BoxError>(7) }, 256).unwrap();
        assert_eq!(handle.await.unwrap(), 7);
        assert_eq!(d.memory().available_mb(), 512);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_before_dispatch() {
        let d = dispatcher();
        let start = tokio::time::Instant::now();
        let value = d
            .execute_with_delay(|| async { Ok::<_, BoxError>(tokio::time::Instant::now()) }, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(value - start >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_zero_before_dispatch() {
        let d = dispatcher();
        let invoked = Arc::new(AtomicU32::new(0));
        let i = invoked.clone();
        let result = d.process_with_rate_limit(
            futures_util::stream::iter(0..3u32),
            move |n| {
                i.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, BoxError>(n) }
            },
            0,
        );
        assert!(matches!(result, Err(DispatchError::InvalidConfig(_))));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parallel_yields_one_result_per_input() {
        let d = dispatcher();
        let works: Vec<_> = (0..6u32).map(|n| move || async move { Ok::<_, BoxError>(n * n) }).collect();
        let mut squares: Vec<u32> = d.execute_parallel(works).map(|r| r.unwrap()).collect().await;
        squares.sort();
        assert_eq!(squares, vec![0, 1, 4, 9, 16, 25]);
    }
}
