//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Forward to upstream:
//!     → per-attempt timeout (http::forward)
//!     → On network failure: backoff.rs (delay), then retry with a replayed body
//! ```
//!
//! # Design Decisions
//! - Only requests carrying a replayable body are retried

pub mod backoff;
