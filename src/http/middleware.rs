//! Form mutation middleware.
//!
//! Wraps [`FormFilter`] as an axum middleware function so it can sit in
//! front of any handler or router.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::schema::ParseErrorPolicy;
use crate::http::filter::{FormFilter, Outcome, Rejected};
use crate::http::X_REQUEST_ID;
use crate::observability::metrics;

/// Shared handle to the active filter.
///
/// Each request loads one snapshot; a reload swaps in a whole new filter and
/// never touches the one in-flight requests hold.
#[derive(Clone)]
pub struct FilterState {
    current: Arc<ArcSwap<FormFilter>>,
}

impl FilterState {
    pub fn new(filter: FormFilter) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(filter)),
        }
    }

    /// The filter in effect right now.
    pub fn load(&self) -> Arc<FormFilter> {
        self.current.load_full()
    }

    /// Atomically replace the active filter.
    pub fn replace(&self, filter: FormFilter) {
        self.current.store(Arc::new(filter));
    }
}

pub async fn form_mutation_middleware(
    State(state): State<FilterState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let filter = state.load();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    match filter.transform(request).await {
        Ok(Outcome::Passthrough(request)) => {
            metrics::record_form_request("other", "passthrough");
            next.run(request).await
        }
        Ok(Outcome::Rewritten {
            request,
            kind,
            original_len,
            rewritten_len,
        }) => {
            tracing::debug!(
                request_id = %request_id,
                kind = kind.as_str(),
                original_len,
                rewritten_len,
                "Form body rewritten"
            );
            metrics::record_form_request(kind.as_str(), "rewritten");
            metrics::record_rewrite_size(kind.as_str(), rewritten_len);
            next.run(request).await
        }
        Err(Rejected {
            kind,
            error,
            original,
        }) => {
            metrics::record_form_request(kind.as_str(), error.kind());
            match (filter.on_parse_error(), original) {
                (ParseErrorPolicy::Forward, Some(original)) => {
                    tracing::warn!(
                        request_id = %request_id,
                        kind = kind.as_str(),
                        error = %error,
                        "Form body not rewritten, forwarding original"
                    );
                    next.run(original).await
                }
                _ => {
                    tracing::warn!(
                        request_id = %request_id,
                        kind = kind.as_str(),
                        status = error.status().as_u16(),
                        error = %error,
                        "Rejecting form request"
                    );
                    error.into_response()
                }
            }
        }
    }
}
