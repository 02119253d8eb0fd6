//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: form mutation middleware in front of the forwarder
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener
//! - Apply config reloads by swapping the active filter

use std::time::Duration;

use axum::{middleware, routing::any, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ConfigError, ProxyConfig, UpstreamConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::http::filter::FormFilter;
use crate::http::forward::{forward_handler, ForwardState};
use crate::http::middleware::{form_mutation_middleware, FilterState};
use crate::http::X_REQUEST_ID;

/// HTTP server for the form-mutating proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    filter: FilterState,
}

impl HttpServer {
    /// Create a new HTTP server. Fails if the configuration is invalid,
    /// including when no mutations are configured.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let filter = FilterState::new(FormFilter::from_config(&config)?);
        let forward = ForwardState::new(config.upstream.clone()).map_err(|e| {
            ValidationError::InvalidUpstreamUrl {
                url: config.upstream.url.clone(),
                reason: e.to_string(),
            }
        })?;

        let router = Self::build_router(&config, filter.clone(), forward);
        Ok(Self {
            router,
            config,
            filter,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, filter: FilterState, forward: ForwardState) -> Router {
        let header = axum::http::HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .route("/{*path}", any(forward_handler))
            .route("/", any(forward_handler))
            .with_state(forward)
            .layer(middleware::from_fn_with_state(filter, form_mutation_middleware))
            .layer(TimeoutLayer::new(route_timeout(&config.upstream)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(header.clone()))
            .layer(SetRequestIdLayer::new(header, MakeRequestUuid))
    }

    /// The router, for embedding or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Handle to the active filter.
    pub fn filter(&self) -> FilterState {
        self.filter.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, applying configs from `config_updates`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let filter = self.filter.clone();
        let current = self.config.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                apply_reload(&filter, &current, &new_config);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Overall deadline for one client request: every upstream attempt, the
/// longest backoff (with jitter) between attempts, and a second of slack for
/// reading the body. The forwarder enforces the per-attempt timeout itself.
fn route_timeout(upstream: &UpstreamConfig) -> Duration {
    let attempts = u64::from(upstream.max_attempts.max(1));
    let attempt_ms = upstream.request_timeout_secs.saturating_mul(1000);
    let backoff_ms = upstream.max_delay_ms.saturating_add(upstream.max_delay_ms / 10);

    let total_ms = attempt_ms
        .saturating_mul(attempts)
        .saturating_add(backoff_ms.saturating_mul(attempts - 1))
        .saturating_add(1000);
    Duration::from_millis(total_ms)
}

/// Swap in a filter built from `new_config`. Settings that need a rebind
/// or a new client are only reported.
fn apply_reload(filter: &FilterState, current: &ProxyConfig, new_config: &ProxyConfig) {
    match FormFilter::from_config(new_config) {
        Ok(new_filter) => {
            filter.replace(new_filter);
            tracing::info!(
                delete = new_config.mutations.delete.len(),
                set = new_config.mutations.set.len(),
                append = new_config.mutations.append.len(),
                "Form mutations reloaded"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Rejected config reload, keeping current filter");
            return;
        }
    }

    if new_config.listener != current.listener || new_config.upstream != current.upstream {
        tracing::warn!("Listener and upstream changes take effect after restart");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.mutations.delete.push("a".into());
        config
    }

    #[test]
    fn test_new_rejects_empty_mutations() {
        let err = HttpServer::new(ProxyConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors == &[ValidationError::EmptyMutations]));
    }

    #[test]
    fn test_route_timeout_covers_retries() {
        let upstream = UpstreamConfig {
            request_timeout_secs: 2,
            max_attempts: 3,
            max_delay_ms: 500,
            ..UpstreamConfig::default()
        };
        // 3 × 2s + 2 × 550ms + 1s
        assert_eq!(route_timeout(&upstream), Duration::from_millis(8100));

        let single = UpstreamConfig {
            request_timeout_secs: 30,
            max_attempts: 1,
            ..UpstreamConfig::default()
        };
        assert_eq!(route_timeout(&single), Duration::from_secs(31));
    }

    #[tokio::test]
    async fn test_reload_swaps_filter() {
        let server = HttpServer::new(config()).unwrap();
        let handle = server.filter();
        assert_eq!(handle.load().spec().delete_keys(), ["a"]);

        let mut updated = config();
        updated.mutations.delete = vec!["b".into()];
        apply_reload(&handle, server.config(), &updated);
        assert_eq!(handle.load().spec().delete_keys(), ["b"]);

        apply_reload(&handle, server.config(), &ProxyConfig::default());
        assert_eq!(handle.load().spec().delete_keys(), ["b"]);
    }
}
