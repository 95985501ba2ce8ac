//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!
//! On file change (--watch):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the demo section (ArcSwap)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; reload produces a new value
//! - All fields have defaults to allow minimal configs
//! - Only handler tuning is reloadable; listener and telemetry need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    DemoConfig, ListenerConfig, LogFormat, MetricsConfig, ObservabilityConfig, ServiceConfig,
    TimeoutConfig, TracingConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
