//! Errors raised while transforming a request body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// The body could not be decoded; the client sent something we cannot rewrite.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("request body exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("invalid form body: {0}")]
    UrlEncoded(String),

    #[error("invalid multipart body: {0}")]
    Multipart(String),
}

/// Failure of a single transformation attempt.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to rebuild request body: {0}")]
    Reconstruction(String),
}

impl FilterError {
    /// Status code reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            FilterError::Parse(_) => StatusCode::BAD_REQUEST,
            FilterError::Reconstruction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FilterError::Parse(_) => "parse_error",
            FilterError::Reconstruction(_) => "reconstruction_error",
        }
    }
}

impl IntoResponse for FilterError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
