//! Replaceable, re-readable request bodies.
//!
//! # Responsibilities
//! - Swap a request's body for rewritten bytes
//! - Keep Content-Length in step with the new bytes
//! - Let later stages (retries, downstream handlers) read the body again
//!
//! # Design Decisions
//! - The snapshot is `Bytes`, so every new reader is a refcount bump
//! - The snapshot lives in request extensions and travels with the request

use axum::body::Body;
use axum::http::{header, HeaderValue, Request};
use bytes::Bytes;

/// Snapshot of a rewritten body that can produce fresh readers on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayBody {
    bytes: Bytes,
}

impl ReplayBody {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// A new body that reads the snapshot from the beginning.
    pub fn body(&self) -> Body {
        Body::from(self.bytes.clone())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Replace the request body with `bytes`, fix up the framing headers and
/// attach a [`ReplayBody`] for later readers.
pub fn replace_body(request: &mut Request<Body>, bytes: Bytes) {
    let replay = ReplayBody::new(bytes);
    let headers = request.headers_mut();
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(replay.len()));

    *request.body_mut() = replay.body();
    request.extensions_mut().insert(replay);
}

/// Convenience accessor for a request's replay snapshot.
pub trait ReplayBodyExt {
    fn replay_body(&self) -> Option<&ReplayBody>;
}

impl<B> ReplayBodyExt for Request<B> {
    fn replay_body(&self) -> Option<&ReplayBody> {
        self.extensions().get::<ReplayBody>()
    }
}
