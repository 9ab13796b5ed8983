//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: testing if dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: after recovery timeout
//! Half-Open → Closed: probe call succeeds
//! Half-Open → Open: probe call fails (recovery timer restarts)
//! ```
//!
//! # Design Decisions
//! - Per-operation-class breaker, persistent across calls
//! - Fail fast in Open state (wrapped work is never invoked)
//! - Single probe in Half-Open (prevents hammering a recovering dependency)
//! - Local rejections (saturation, closed pool) are not dependency failures

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::types::{DispatchError, DispatchResult};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn gauge(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

/// Thresholds for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl BreakerSettings {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self { failure_threshold: failure_threshold.max(1), recovery_timeout }
    }
}

/// How a call got through the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted while closed.
    Normal,
    /// The single Half-Open trial call.
    Probe,
}

/// Monitoring view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub operation: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Stateful guard for one operation class.
#[derive(Debug)]
pub struct CircuitBreaker {
    operation: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(operation: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            operation: operation.into(),
            settings,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current state, reporting Half-Open once the recovery timeout has elapsed.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) if at.elapsed() >= self.settings.recovery_timeout => {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            operation: self.operation.clone(),
            state: self.state(),
            consecutive_failures: self.failure_count(),
            failure_threshold: self.settings.failure_threshold,
        }
    }

    /// Admit a call or fail with `CircuitOpen`.
    ///
    /// The returned admission must be handed back to `record_success` or `record_failure`.
    pub fn try_acquire(&self) -> DispatchResult<Admission> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let recovered = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.settings.recovery_timeout)
                    .unwrap_or(true);
                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    drop(inner);
                    tracing::info!(operation = %self.operation, "Circuit half-open, allowing probe");
                    metrics::record_circuit_state(&self.operation, CircuitState::HalfOpen.gauge());
                    Ok(Admission::Probe)
                } else {
                    Err(self.open_error())
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(self.open_error())
                } else {
                    inner.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    /// Record a success. Only a probe may close a tripped circuit.
    pub fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if admission != Admission::Probe {
            return;
        }

        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        drop(inner);

        tracing::info!(operation = %self.operation, "Circuit closed");
        metrics::record_circuit_state(&self.operation, CircuitState::Closed.gauge());
    }

    /// Record a terminal failure.
    ///
    /// Calls admitted while closed can trip a closed circuit; a failed probe reopens it.
    /// Late results from calls admitted before a trip never move a tripped circuit.
    pub fn record_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let failures = inner.consecutive_failures;

        let trip = match (admission, inner.state) {
            (Admission::Probe, _) => true,
            (Admission::Normal, CircuitState::Closed) => failures >= self.settings.failure_threshold,
            (Admission::Normal, _) => false,
        };
        if admission == Admission::Probe {
            inner.probe_in_flight = false;
        }

        if trip {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            drop(inner);
            tracing::warn!(
                operation = %self.operation,
                consecutive_failures = failures,
                recovery_timeout_ms = self.settings.recovery_timeout.as_millis() as u64,
                "Circuit opened"
            );
            metrics::record_circuit_state(&self.operation, CircuitState::Open.gauge());
        }
    }

    /// Hand back an admission without recording an outcome.
    fn release(&self, admission: Admission) {
        if admission == Admission::Probe {
            self.lock().probe_in_flight = false;
        }
    }

    /// Run `call` through the breaker.
    ///
    /// While open, `call` is never invoked.
    pub async fn call<T, F, Fut>(&self, call: F) -> DispatchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DispatchResult<T>>,
    {
        let admission = self.try_acquire()?;
        let mut guard = CallGuard { breaker: self, admission, settled: false };

        let result = call().await;
        match &result {
            Ok(_) => self.record_success(admission),
            Err(e) if counts_as_failure(e) => self.record_failure(admission),
            Err(_) => self.release(admission),
        }
        guard.settled = true;
        result
    }

    fn open_error(&self) -> DispatchError {
        DispatchError::CircuitOpen { operation: self.operation.clone() }
    }
}

/// Frees the probe slot if the caller stops waiting mid-call.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.admission);
        }
    }
}

fn counts_as_failure(e: &DispatchError) -> bool {
    !matches!(
        e,
        DispatchError::PoolSaturated { .. }
            | DispatchError::PoolClosed { .. }
            | DispatchError::InvalidConfig(_)
            | DispatchError::CircuitOpen { .. }
    )
}

/// Breakers keyed by operation class.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the breaker for `operation`, creating it with `settings` on first use.
    ///
    /// Settings of an existing breaker are not changed.
    pub fn get_or_create(&self, operation: &str, settings: BreakerSettings) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(operation) {
            if breaker.settings() != settings {
                tracing::debug!(
                    operation,
                    "Circuit breaker already registered with different settings, keeping existing"
                );
            }
            return breaker.clone();
        }
        self.breakers
            .entry(operation.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(operation, settings)))
            .clone()
    }

    pub fn get(&self, operation: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(operation).map(|b| b.clone())
    }

    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.operation.cmp(&b.operation));
        snapshots
    }
}
