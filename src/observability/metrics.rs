//! Metrics collection and exposition.
//!
//! # Metrics
//! - `formdata_requests_total` (counter): requests seen by the filter, by kind and outcome
//! - `formdata_rewrite_bytes` (histogram): size of rewritten bodies
//! - `formdata_upstream_requests_total` (counter): forwarded requests by status
//! - `formdata_upstream_duration_seconds` (histogram): upstream latency

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_form_request(kind: &'static str, outcome: &'static str) {
    metrics::counter!("formdata_requests_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_rewrite_size(kind: &'static str, bytes: usize) {
    metrics::histogram!("formdata_rewrite_bytes", "kind" => kind).record(bytes as f64);
}

pub fn record_upstream(status: u16, start: Instant) {
    let status = status.to_string();
    metrics::counter!("formdata_upstream_requests_total", "status" => status).increment(1);
    metrics::histogram!("formdata_upstream_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}
