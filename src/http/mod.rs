//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → middleware.rs (load active FormFilter)
//!     → filter.rs (dispatch on Content-Type, rewrite body)
//!     → body.rs (replace body, Content-Length, replay snapshot)
//!     → forward.rs (send upstream, replay body on retry)
//!     → Send response to client
//! ```

pub mod body;
pub mod filter;
pub mod forward;
pub mod middleware;
pub mod server;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

pub use body::{replace_body, ReplayBody, ReplayBodyExt};
pub use filter::{FormFilter, Outcome, Rejected};
pub use middleware::{form_mutation_middleware, FilterState};
pub use server::HttpServer;
