//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject a mutation section with nothing to do
//! - Validate addresses, URLs and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, including on reload

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{MutationConfig, ProxyConfig};

/// A single semantic problem with the configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("at least one of set, append, or delete must be provided")]
    EmptyMutations,

    #[error("mutation field names must not be empty (in {0})")]
    EmptyFieldName(&'static str),

    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("invalid upstream url {url:?}: {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },

    #[error("upstream url scheme {0:?} is not supported, use http")]
    UnsupportedScheme(String),

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate the whole configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_mutations(&config.mutations) {
        errors.push(e);
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    match Url::parse(&config.upstream.url) {
        Ok(url) if url.scheme() != "http" => {
            errors.push(ValidationError::UnsupportedScheme(url.scheme().to_string()));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidUpstreamUrl {
            url: config.upstream.url.clone(),
            reason: e.to_string(),
        }),
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let positive = [
        ("upstream.max_attempts", u64::from(config.upstream.max_attempts)),
        ("upstream.request_timeout_secs", config.upstream.request_timeout_secs),
        ("limits.max_urlencoded_bytes", config.limits.max_urlencoded_bytes),
        ("limits.max_multipart_bytes", config.limits.max_multipart_bytes),
    ];
    for (name, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The mutation section on its own; also used when building a filter.
pub fn validate_mutations(mutations: &MutationConfig) -> Result<(), ValidationError> {
    if mutations.set.is_empty() && mutations.append.is_empty() && mutations.delete.is_empty() {
        return Err(ValidationError::EmptyMutations);
    }
    if mutations.delete.iter().any(String::is_empty) {
        return Err(ValidationError::EmptyFieldName("delete"));
    }
    if mutations.set.keys().any(String::is_empty) {
        return Err(ValidationError::EmptyFieldName("set"));
    }
    if mutations.append.keys().any(String::is_empty) {
        return Err(ValidationError::EmptyFieldName("append"));
    }
    Ok(())
}
