//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Guarded call:
//!     → circuit_breaker.rs (fail fast while open, count terminal failures)
//!     → retries.rs (re-submit on timeout or transient failure)
//!     → timeouts.rs (per-attempt deadline)
//!     → worker pool
//! ```
//!
//! # Design Decisions
//! - Every category call has a deadline
//! - Breaker state persists across calls, keyed by operation class
//! - A breaker sees one outcome per call, after retries are exhausted
//! - Deadlines abandon waiting; running work is not cancelled

pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{Admission, BreakerSettings, CircuitBreaker, CircuitBreakerRegistry, CircuitSnapshot, CircuitState};
pub use retries::RetryPolicy;
pub use timeouts::with_deadline;
