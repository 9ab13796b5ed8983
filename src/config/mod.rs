//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatcherConfig (validated, immutable)
//!     → PoolDescriptors derived once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; pool sizing never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::DispatcherConfig;
pub use schema::PoolConfig;
pub use schema::PoolsConfig;
pub use schema::TimeoutConfig;
pub use schema::CircuitBreakerConfig;
pub use schema::BackpressureConfig;
pub use schema::MemoryConfig;
pub use schema::ObservabilityConfig;
