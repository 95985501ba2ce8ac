//! Span export to the trace collector.
//!
//! # Responsibilities
//! - Build the OpenTelemetry tracer provider behind the `tracing` bridge
//! - Batch closed spans and push them to the Zipkin collector
//! - Log export failures without retrying or blocking requests
//!
//! # Data Flow
//! ```text
//! span closes (request task)
//!     → tracing_opentelemetry layer (otel.name, otel.kind, otel.status_code)
//!     → BatchSpanProcessor queue (full → span dropped)
//!     → LoggedExporter (timeout, failure logging)
//!     → opentelemetry_zipkin exporter (Zipkin v2 JSON over HTTP)
//! ```
//!
//! # Design Decisions
//! - A failed batch is dropped and logged, never retried
//! - The first failure logs at warn, repeats at debug, recovery at info
//! - Only this crate's spans are exported

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use opentelemetry::trace::TraceError;
use opentelemetry::KeyValue;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, Config, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::filter::{LevelFilter, Targets};

use crate::config::TracingConfig;

/// Spans from this crate only; dependency internals are not exported.
pub fn export_filter() -> Targets {
    Targets::new().with_target(env!("CARGO_CRATE_NAME"), LevelFilter::TRACE)
}

/// Exporter wrapper that bounds each export and logs failures.
///
/// Always reports success to the batch processor: a failed batch is
/// dropped here, after logging.
pub struct LoggedExporter<E> {
    inner: E,
    timeout: Duration,
    healthy: Arc<AtomicBool>,
}

impl<E> LoggedExporter<E> {
    pub fn new(inner: E, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for LoggedExporter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggedExporter")
            .field("inner", &self.inner)
            .field("timeout", &self.timeout)
            .field("healthy", &self.healthy.load(Ordering::Relaxed))
            .finish()
    }
}

impl<E: SpanExporter> SpanExporter for LoggedExporter<E> {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let spans = batch.len();
        let timeout = self.timeout;
        let healthy = Arc::clone(&self.healthy);
        let export = self.inner.export(batch);

        Box::pin(async move {
            let result = match tokio::time::timeout(timeout, export).await {
                Ok(result) => result,
                Err(_) => Err(TraceError::ExportTimedOut(timeout)),
            };

            match result {
                Ok(()) => {
                    if !healthy.swap(true, Ordering::Relaxed) {
                        tracing::info!(spans, "Span export recovered");
                    } else {
                        tracing::trace!(spans, "Span batch exported");
                    }
                }
                Err(e) => {
                    if healthy.swap(false, Ordering::Relaxed) {
                        tracing::warn!(spans, error = %e, "Span export failed, dropping batch");
                    } else {
                        tracing::debug!(spans, error = %e, "Span export still failing");
                    }
                }
            }
            Ok(())
        })
    }

    fn shutdown(&mut self) {
        self.inner.shutdown();
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

/// Tracer provider batching spans to the configured Zipkin collector.
///
/// Must be called from within a Tokio runtime.
pub fn tracer_provider(config: &TracingConfig) -> Result<TracerProvider, TraceError> {
    let exporter = opentelemetry_zipkin::new_pipeline()
        .with_service_name(config.service_name.clone())
        .with_collector_endpoint(config.collector_endpoint.clone())
        .init_exporter()?;
    let exporter = LoggedExporter::new(exporter, Duration::from_millis(config.export_timeout_ms));

    Ok(provider_with(exporter, config))
}

/// Provider around any exporter, batching per the tracing config.
#[allow(deprecated)]
pub fn provider_with<E>(exporter: E, config: &TracingConfig) -> TracerProvider
where
    E: SpanExporter + 'static,
{
    let batch = BatchConfigBuilder::default()
        .with_max_queue_size(config.queue_capacity)
        .with_max_export_batch_size(config.max_batch_size)
        .with_scheduled_delay(Duration::from_millis(config.flush_interval_ms))
        .build();
    let processor = BatchSpanProcessor::builder(exporter, runtime::Tokio)
        .with_batch_config(batch)
        .build();

    TracerProvider::builder()
        .with_span_processor(processor)
        .with_config(Config::default().with_resource(service_resource(config)))
        .build()
}

fn service_resource(config: &TracingConfig) -> Resource {
    Resource::new([KeyValue::new("service.name", config.service_name.clone())])
}
