//! Monitoring demo service
//!
//! A small HTTP service whose every request is observed three ways.
//!
//! # Architecture Overview
//!
//! ```text
//!                              ┌──────────────────────────────────────────────────┐
//!                              │                 MONITORING DEMO                   │
//!                              │                                                   │
//!     Client Request           │  ┌────────────┐   ┌──────────────┐   ┌─────────┐ │
//!     ─────────────────────────┼─▶│ request id │──▶│  instrument  │──▶│ handler │ │
//!                              │  │  + panic   │   │  middleware  │   │ (/ ...) │ │
//!                              │  └────────────┘   └──────┬───────┘   └─────────┘ │
//!                              │                          │                        │
//!                              │        ┌─────────────────┼──────────────┐         │
//!                              │        ▼                 ▼              ▼         │
//!                              │  ┌───────────┐   ┌──────────────┐  ┌──────────┐  │
//!                              │  │  metrics  │   │  JSON access │  │  spans   │  │
//!                              │  │ registry  │   │     log      │  │  batch   │  │
//!                              │  └─────┬─────┘   └──────┬───────┘  └────┬─────┘  │
//!                              │        │                │               │        │
//!     GET /metrics             │        ▼                ▼               ▼        │
//!     ◀────────────────────────┼── exposition          stdout        zipkin ─────┼──▶ Collector
//!                              │                                                   │
//!                              └──────────────────────────────────────────────────┘
//! ```
//!
//! # Startup
//! 1. Load and validate configuration
//! 2. Install logging and span export
//! 3. Build the metrics registry and bind the listener
//! 4. Serve until SIGINT/SIGTERM, draining histograms every few seconds
//! 5. Flush pending spans

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use monitoring_demo::config::{
    load_config, validate_config, ConfigError, ConfigWatcher, ServiceConfig,
};
use monitoring_demo::lifecycle::{signals::shutdown_on_signal, Shutdown};
use monitoring_demo::observability::metrics::UPKEEP_INTERVAL;
use monitoring_demo::observability::{self, MetricsRegistry};
use monitoring_demo::HttpServer;

#[derive(Parser)]
#[command(name = "monitoring-demo")]
#[command(about = "HTTP demo service with metrics, structured logs and traces", long_about = None)]
struct Args {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Reload the demo settings when the configuration file changes
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    let telemetry = observability::init(&config)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "monitoring-demo starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        metrics_path = %config.metrics.path,
        tracing_enabled = config.tracing.enabled,
        request_timeout_secs = ?config.timeouts.request_secs,
        "Configuration loaded"
    );

    let metrics = Arc::new(MetricsRegistry::new(&config.metrics)?);
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    // The watcher stops when dropped, so it lives until the server returns.
    let (_watcher, config_updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));
    let upkeep = Arc::clone(&metrics).spawn_upkeep(UPKEEP_INTERVAL, shutdown.subscribe());

    let server = HttpServer::new(config, metrics);
    server.run(listener, config_updates, shutdown.subscribe()).await?;
    shutdown.trigger();
    let _ = upkeep.await;

    telemetry.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
