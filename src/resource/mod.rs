//! Resource lifetime subsystem.
//!
//! # Data Flow
//! ```text
//! executeWithResource:
//!     acquire → ResourceHandle (resource + release)
//!     → pool task owns handle → use → handle dropped → release (once)
//!
//! executeWithMemoryManagement:
//!     MemoryBudget::try_reserve(ceiling) → InsufficientMemory | reservation
//!     → pool task owns reservation → returned on completion
//! ```
//!
//! # Design Decisions
//! - Resources are never shared between invocations
//! - Release and budget return are tied to Drop, not to control flow

pub mod memory;
pub mod scoped;

pub use memory::{MemoryBudget, MemoryReservation};
pub use scoped::{ResourceHandle, ScopedExecutor};
