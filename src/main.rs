//! Form-mutating reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request      ┌──────────────────────────────────────────────┐
//!     ────────────────────┼─▶ request id → trace → timeout               │
//!                         │        │                                     │
//!                         │        ▼                                     │
//!                         │  form mutation middleware                    │
//!                         │   ├─ urlencoded: parse → mutate → encode     │
//!                         │   ├─ multipart:  parse → mutate → rebuild    │
//!                         │   └─ other:      untouched                   │
//!                         │        │                                     │
//!                         │        ▼                                     │
//!     Client Response     │  forward handler ──────────────────────────┼──▶ Upstream
//!     ◀───────────────────┼──────────────────────────────────────────────┤
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use formdata_proxy::config::{load_config, watcher::ConfigWatcher};
use formdata_proxy::observability::{logging, metrics};
use formdata_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "formdata-proxy")]
#[command(about = "Reverse proxy that rewrites form request bodies", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "formdata-proxy.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        println!("{}: configuration ok", cli.config.display());
        return ExitCode::SUCCESS;
    }

    logging::init(&config.observability);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Proxy exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    cli: Cli,
    config: formdata_proxy::ProxyConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("formdata-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        delete = config.mutations.delete.len(),
        set = config.mutations.set.len(),
        append = config.mutations.append.len(),
        on_parse_error = ?config.filter.on_parse_error,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    // Keep the watcher alive for the life of the server.
    let (_watcher, config_updates) = if cli.no_watch {
        let (_tx, rx) = mpsc::unbounded_channel();
        (None, rx)
    } else {
        let (watcher, rx) = ConfigWatcher::new(&cli.config);
        (Some(watcher.run()?), rx)
    };

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
