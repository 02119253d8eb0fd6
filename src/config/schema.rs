//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from the TOML file.
//! Every section except `mutations` has usable defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the form-mutating proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where rewritten requests are forwarded.
    pub upstream: UpstreamConfig,

    /// Buffering limits per body encoding.
    pub limits: LimitsConfig,

    /// Filter behavior on failures.
    pub filter: FilterConfig,

    /// Field mutations applied to every form body.
    pub mutations: MutationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream (downstream handler) configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream service, e.g. "http://127.0.0.1:3000".
    pub url: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total time allowed for one upstream attempt, in seconds.
    pub request_timeout_secs: u64,

    /// Attempts made on network errors. Only requests whose body can be
    /// replayed get more than one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            max_attempts: 2,
            base_delay_ms: 50,
            max_delay_ms: 1000,
        }
    }
}

/// Maximum body sizes buffered for rewriting.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    /// URL-encoded body limit in bytes.
    pub max_urlencoded_bytes: u64,

    /// Multipart body limit in bytes (fields and files together).
    pub max_multipart_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_urlencoded_bytes: 10 * 1024 * 1024, // 10MB
            max_multipart_bytes: 32 * 1024 * 1024, // 32MB
        }
    }
}

/// What to do with a request whose body could not be rewritten.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorPolicy {
    /// Answer with the error status; the downstream handler never runs.
    #[default]
    Reject,
    /// Log the error and forward the original, unmodified body.
    Forward,
}

/// Filter behavior.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FilterConfig {
    pub on_parse_error: ParseErrorPolicy,
}

/// Declarative form field mutations.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MutationConfig {
    /// Create or overwrite a field with a single value.
    pub set: BTreeMap<String, String>,

    /// Add one more value to a field (does not replace).
    pub append: BTreeMap<String, String>,

    /// Remove fields entirely.
    pub delete: Vec<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
