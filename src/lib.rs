//! Inline HTTP filter that rewrites form request bodies.
//!
//! URL-encoded and multipart form bodies get a fixed set of field mutations
//! (delete, set, append) before the request continues downstream. Multipart
//! file parts pass through byte-for-byte.

pub mod config;
pub mod error;
pub mod form;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use error::{FilterError, ParseError};
pub use form::{FormFields, FormKind, MutationSpec};
pub use http::{FormFilter, HttpServer};
pub use lifecycle::Shutdown;
