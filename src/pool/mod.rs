//! Worker pool subsystem.
//!
//! # Data Flow
//! ```text
//! submit(kind, work)
//!     → set.rs (select the category pool)
//!     → worker.rs (admit: pending < queue_capacity, else PoolSaturated)
//!     → spawn task, wait for one of max_concurrency permits
//!     → run computation, release slot
//!     → TaskHandle resolves with the result
//! ```
//!
//! # Design Decisions
//! - One pool per category so slow AI work cannot starve generic work
//! - Descriptors are immutable and shared by reference
//! - Submission never blocks; waiting happens only where the caller awaits

pub mod descriptor;
pub mod set;
pub mod worker;

pub use descriptor::{PoolDescriptor, WorkloadKind};
pub use set::PoolSet;
pub use worker::{PoolStats, TaskHandle, WorkerPool};
