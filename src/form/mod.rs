//! Form body transformation subsystem.
//!
//! # Data Flow
//! ```text
//! Content-Type header
//!     → FormKind::detect (dispatch)
//!     → urlencoded.rs  (parse → mutate → re-encode)
//!     → multipart.rs   (parse → mutate text fields → rebuild with file passthrough)
//!     → rewritten bytes handed back to http::filter
//!
//! Both codecs share:
//!     fields.rs   (ordered multi-map)
//!     mutation.rs (delete → set → append)
//! ```
//!
//! # Design Decisions
//! - Codecs are pure functions over bytes; no I/O happens here
//! - Key order is lexical everywhere, so output is deterministic
//! - File parts are never decoded, only relocated

pub mod fields;
pub mod multipart;
pub mod mutation;
pub mod urlencoded;

use axum::http::{header, HeaderMap};

pub use fields::FormFields;
pub use multipart::{FilePart, MultipartForm};
pub use mutation::MutationSpec;

/// Media type prefix for URL-encoded form bodies.
pub const URLENCODED: &str = "application/x-www-form-urlencoded";

/// Media type prefix for multipart form bodies.
pub const MULTIPART: &str = "multipart/form-data";

/// The body encodings this filter knows how to rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    UrlEncoded,
    Multipart,
}

impl FormKind {
    /// Pick a codec from the request's Content-Type header.
    ///
    /// Returns `None` for any other media type, a missing header, or a
    /// header value that is not visible ASCII.
    pub fn detect(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        Self::from_content_type(content_type)
    }

    /// Prefix match on a raw Content-Type value (case-insensitive).
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        if starts_with_ignore_case(content_type, URLENCODED) {
            Some(FormKind::UrlEncoded)
        } else if starts_with_ignore_case(content_type, MULTIPART) {
            Some(FormKind::Multipart)
        } else {
            None
        }
    }

    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::UrlEncoded => "urlencoded",
            FormKind::Multipart => "multipart",
        }
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}
