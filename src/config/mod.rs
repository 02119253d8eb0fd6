//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, non-empty mutations)
//!     → ProxyConfig (validated, immutable)
//!     → FormFilter built once, shared via Arc
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads + validates new config
//!     → http::server swaps in a new FormFilter atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs, except mutations
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    FilterConfig, LimitsConfig, ListenerConfig, LogFormat, MutationConfig, ObservabilityConfig,
    ParseErrorPolicy, ProxyConfig, UpstreamConfig,
};
pub use validation::ValidationError;
