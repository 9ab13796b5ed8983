//! Background task dispatcher for the meeting-transcription backend.

pub mod config;
pub mod dispatch;
pub mod pipeline;
pub mod pool;
pub mod resource;
pub mod types;

pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::DispatcherConfig;
pub use dispatch::Dispatcher;
pub use lifecycle::Shutdown;
pub use pool::WorkloadKind;
pub use types::{BoxError, DispatchError, DispatchResult, Outcome};
