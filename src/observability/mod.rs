//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Instrumented request pipeline produces:
//!     → logging.rs (one structured log record per request)
//!     → metrics.rs (request counter, latency histogram)
//!     → span_export.rs (request span + handler child spans)
//!
//! Consumers:
//!     → Log shipper tailing stdout
//!     → Metrics endpoint (Prometheus scrape)
//!     → Trace collector (OpenTelemetry batch, Zipkin v2 push)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows into the log record and the span tags
//! - Metrics are cheap (atomic increments)
//! - Span export never blocks a request; failures drop data, not requests

pub mod logging;
pub mod metrics;
pub mod span_export;

use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry_sdk::trace::TracerProvider;
use thiserror::Error;

use crate::config::ServiceConfig;

pub use self::metrics::{MetricsError, MetricsRegistry};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("span exporter: {0}")]
    Exporter(#[from] TraceError),

    #[error("logging already initialized: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}

/// Running telemetry background work.
pub struct Telemetry {
    provider: Option<TracerProvider>,
}

impl Telemetry {
    /// Flush pending spans. Call after the server stopped accepting requests.
    pub async fn shutdown(self) {
        let Some(provider) = self.provider else {
            return;
        };

        // Provider shutdown blocks until the batch task drains.
        match tokio::task::spawn_blocking(move || provider.shutdown()).await {
            Ok(Ok(())) => tracing::info!("Span export flushed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Span export shutdown failed"),
            Err(e) => tracing::warn!(error = %e, "Span export shutdown task failed"),
        }
    }
}

/// Install logging and, when enabled, span export to the collector.
///
/// Must be called from within a multi-threaded Tokio runtime.
pub fn init(config: &ServiceConfig) -> Result<Telemetry, TelemetryError> {
    let provider = if config.tracing.enabled {
        Some(span_export::tracer_provider(&config.tracing)?)
    } else {
        None
    };
    let tracer = provider
        .as_ref()
        .map(|provider| provider.tracer(env!("CARGO_PKG_NAME")));

    logging::init_logging(&config.observability, tracer)?;

    if config.tracing.enabled {
        tracing::info!(
            collector = %config.tracing.collector_endpoint,
            service_name = %config.tracing.service_name,
            "Span export enabled"
        );
    }

    Ok(Telemetry { provider })
}
