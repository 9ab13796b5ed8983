//! Dispatch facade subsystem.
//!
//! # Data Flow
//! ```text
//! caller
//!     → Dispatcher (facade.rs)
//!         → category call: breaker → retry policy → category pool
//!         → generic call:  generic pool (cpu / io / delay / memory / resource)
//!         → sequences:     pipeline (batch / backpressure / rate limit / fan-out)
//!     → TaskHandle | Outcome | ResultStream
//! ```
//!
//! # Design Decisions
//! - One `Dispatcher` per process, cloned into whoever needs it
//! - Breakers are keyed by operation class and live as long as the dispatcher

pub mod facade;

pub use facade::Dispatcher;
