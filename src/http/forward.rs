//! Forwarding to the upstream service.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the upstream base URL
//! - Copy method and headers unchanged
//! - Retry network failures when the body can be replayed
//!
//! # Design Decisions
//! - A request without a [`ReplayBody`] is sent exactly once; its body
//!   stream can only be read a single time
//! - Upstream timeouts map to 504, other transport failures to 502

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{uri::PathAndQuery, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::config::schema::UpstreamConfig;
use crate::http::body::ReplayBody;
use crate::observability::metrics;
use crate::resilience::backoff::retry_delay;

/// State for the forwarding handler.
#[derive(Clone)]
pub struct ForwardState {
    client: Client<HttpConnector, Body>,
    base: Url,
    config: UpstreamConfig,
}

impl ForwardState {
    /// Build the client for an upstream. The URL must already be validated.
    pub fn new(config: UpstreamConfig) -> Result<Self, url::ParseError> {
        let base = Url::parse(&config.url)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            base,
            config,
        })
    }

    /// Map an incoming request URI onto the upstream.
    fn upstream_uri(&self, incoming: &Uri) -> Result<Uri, axum::http::Error> {
        let prefix = self.base.path().trim_end_matches('/');
        let path_and_query = incoming
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/");
        let authority = match self.base.port() {
            Some(port) => format!("{}:{}", self.base.host_str().unwrap_or_default(), port),
            None => self.base.host_str().unwrap_or_default().to_string(),
        };

        Uri::builder()
            .scheme(self.base.scheme())
            .authority(authority.as_str())
            .path_and_query(format!("{}{}", prefix, path_and_query))
            .build()
    }
}

/// Downstream handler: send the (possibly rewritten) request upstream.
pub async fn forward_handler(State(state): State<ForwardState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();

    let uri = match state.upstream_uri(&parts.uri) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(error = %e, uri = %parts.uri, "Cannot map request onto upstream");
            return (StatusCode::BAD_GATEWAY, "Invalid upstream target").into_response();
        }
    };

    let replay = parts.extensions.get::<ReplayBody>().cloned();
    let max_attempts = if replay.is_some() {
        state.config.max_attempts.max(1)
    } else {
        1
    };
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let mut body = Some(body);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let attempt_body = match &replay {
            Some(replay) => replay.body(),
            None => body.take().unwrap_or_else(Body::empty),
        };

        let mut builder = Request::builder().method(parts.method.clone()).uri(uri.clone());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(parts.headers.clone());
        }
        let upstream_request = match builder.body(attempt_body) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build upstream request");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to build upstream request")
                    .into_response();
            }
        };

        let error_status = match tokio::time::timeout(timeout, state.client.request(upstream_request)).await {
            Ok(Ok(response)) => {
                metrics::record_upstream(response.status().as_u16(), start);
                let (parts, body) = response.into_parts();
                return Response::from_parts(parts, Body::new(body));
            }
            Ok(Err(e)) => {
                tracing::warn!(attempt, error = %e, upstream = %uri, "Upstream request failed");
                StatusCode::BAD_GATEWAY
            }
            Err(_) => {
                tracing::warn!(attempt, upstream = %uri, "Upstream request timed out");
                StatusCode::GATEWAY_TIMEOUT
            }
        };

        if attempt < max_attempts {
            let delay = retry_delay(attempt, &state.config);
            tracing::info!(attempt, delay = ?delay, "Retrying with replayed body");
            tokio::time::sleep(delay).await;
            continue;
        }

        metrics::record_upstream(error_status.as_u16(), start);
        return (error_status, "Upstream request failed").into_response();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(url: &str) -> ForwardState {
        ForwardState::new(UpstreamConfig {
            url: url.to_string(),
            ..UpstreamConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_upstream_uri_keeps_path_and_query() {
        let state = state("http://127.0.0.1:3000");
        let uri = state
            .upstream_uri(&"/submit?x=1".parse().unwrap())
            .unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:3000/submit?x=1");
    }

    #[tokio::test]
    async fn test_upstream_uri_with_base_path() {
        let state = state("http://backend/api/");
        let uri = state.upstream_uri(&"/forms".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "http://backend/api/forms");
    }
}
