//! Per-request form transformation.
//!
//! # Responsibilities
//! - Dispatch on Content-Type to the matching codec
//! - Buffer the body within the codec's limit
//! - Swap in the rewritten body, or hand back the original on failure
//!
//! # Design Decisions
//! - All-or-nothing: a request is either fully rewritten or left as sent
//! - Limits are checked against Content-Length before any body is read

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Request};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::config::schema::{LimitsConfig, ParseErrorPolicy, ProxyConfig};
use crate::config::validation::{validate_mutations, ValidationError};
use crate::error::{FilterError, ParseError};
use crate::form::{multipart, urlencoded, FormKind, MutationSpec};
use crate::http::body::replace_body;

/// Result of running the filter on one request.
#[derive(Debug)]
pub enum Outcome {
    /// Not a form body; the request is untouched.
    Passthrough(Request<Body>),
    /// The body was rewritten.
    Rewritten {
        request: Request<Body>,
        kind: FormKind,
        original_len: usize,
        rewritten_len: usize,
    },
}

/// A form body that could not be rewritten.
#[derive(Debug)]
pub struct Rejected {
    pub kind: FormKind,
    pub error: FilterError,
    /// The request with its original headers and body bytes, when the body
    /// was fully read before the failure.
    pub original: Option<Request<Body>>,
}

/// Applies a [`MutationSpec`] to form request bodies.
#[derive(Debug, Clone)]
pub struct FormFilter {
    spec: Arc<MutationSpec>,
    limits: LimitsConfig,
    on_parse_error: ParseErrorPolicy,
}

impl FormFilter {
    pub fn new(spec: MutationSpec, limits: LimitsConfig, on_parse_error: ParseErrorPolicy) -> Self {
        Self {
            spec: Arc::new(spec),
            limits,
            on_parse_error,
        }
    }

    /// Build from a loaded config. Fails if the mutation section is empty.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ValidationError> {
        validate_mutations(&config.mutations)?;
        let spec = MutationSpec::try_from(&config.mutations)?;
        Ok(Self::new(spec, config.limits, config.filter.on_parse_error))
    }

    pub fn spec(&self) -> &MutationSpec {
        &self.spec
    }

    pub fn on_parse_error(&self) -> ParseErrorPolicy {
        self.on_parse_error
    }

    fn limit_for(&self, kind: FormKind) -> u64 {
        match kind {
            FormKind::UrlEncoded => self.limits.max_urlencoded_bytes,
            FormKind::Multipart => self.limits.max_multipart_bytes,
        }
    }

    /// Rewrite the request body if it is a form, otherwise pass it through.
    pub async fn transform(&self, request: Request<Body>) -> Result<Outcome, Rejected> {
        let Some(kind) = FormKind::detect(request.headers()) else {
            return Ok(Outcome::Passthrough(request));
        };

        let limit = self.limit_for(kind);
        let (mut parts, body) = request.into_parts();

        let original = match read_body(&parts.headers, body, limit).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Err(Rejected {
                    kind,
                    error: e.into(),
                    original: None,
                })
            }
        };

        let rewritten = match kind {
            FormKind::UrlEncoded => urlencoded::rewrite(&original, &self.spec)
                .map(|encoded| (Bytes::from(encoded), None))
                .map_err(FilterError::from),
            FormKind::Multipart => {
                let content_type = content_type_of(&parts.headers);
                match multipart::rewrite(original.clone(), &content_type, &self.spec, limit).await {
                    Ok(rebuilt) => HeaderValue::from_str(&rebuilt.content_type())
                        .map(|ct| (rebuilt.bytes, Some(ct)))
                        .map_err(|e| FilterError::Reconstruction(e.to_string())),
                    Err(e) => Err(e),
                }
            }
        };

        match rewritten {
            Ok((bytes, content_type)) => {
                if let Some(content_type) = content_type {
                    parts.headers.insert(header::CONTENT_TYPE, content_type);
                }
                let rewritten_len = bytes.len();
                let mut request = Request::from_parts(parts, Body::empty());
                replace_body(&mut request, bytes);
                Ok(Outcome::Rewritten {
                    request,
                    kind,
                    original_len: original.len(),
                    rewritten_len,
                })
            }
            Err(error) => Err(Rejected {
                kind,
                error,
                original: Some(Request::from_parts(parts, Body::from(original))),
            }),
        }
    }
}

fn content_type_of(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Buffer the body, refusing anything over `limit` bytes.
async fn read_body(headers: &HeaderMap, body: Body, limit: u64) -> Result<Bytes, ParseError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ParseError::TooLarge { limit });
    }

    let max = usize::try_from(limit).unwrap_or(usize::MAX);
    match Limited::new(body, max).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ParseError::TooLarge { limit })
        }
        Err(e) => Err(ParseError::Body(e.to_string())),
    }
}
