//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → subscribers stop → Dispatcher::drain → wait for pending work → exit
//! ```
//!
//! # Design Decisions
//! - Draining stops admission only; running work finishes on its own
//! - Waiting for pending work has a deadline; leftovers are logged, not killed

pub mod shutdown;
pub mod signals;

pub use shutdown::{drain_with_deadline, Shutdown};
pub use signals::wait_for_signal;
