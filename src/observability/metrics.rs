//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Own the process-wide request metrics
//! - Record one counter increment and one latency observation per request
//! - Render the Prometheus text exposition format for `/metrics`
//!
//! # Metrics
//! - `http_request_count_total` (counter): requests by method, endpoint, status
//! - `http_request_latency_seconds` (histogram): latency by method, endpoint
//!
//! # Design Decisions
//! - The registry is an explicit object injected into the pipeline; it wraps a
//!   non-global `PrometheusRecorder`, so independent registries can coexist
//! - Updates are atomic inside the recorder; rendering never mutates counters
//! - `endpoint` is always a route template, keeping series count bounded
//! - Histogram samples buffer until drained; a periodic upkeep task drains
//!   them even when nothing scrapes `/metrics`

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::MetricsConfig;
use crate::lifecycle::ShutdownSignal;

/// Request counter name.
pub const REQUEST_COUNT: &str = "http_request_count_total";

/// Request latency histogram name.
pub const REQUEST_LATENCY: &str = "http_request_latency_seconds";

/// Period of the background histogram drain.
pub const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Content type of the text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid latency buckets: {0}")]
    Buckets(#[from] BuildError),
}

/// Registry holding all request metrics for the process lifetime.
pub struct MetricsRegistry {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    /// Build a registry with the configured latency buckets.
    pub fn new(config: &MetricsConfig) -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_LATENCY.to_string()),
                &config.latency_buckets,
            )?
            .build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_counter!(REQUEST_COUNT, "Total number of HTTP requests");
            describe_histogram!(REQUEST_LATENCY, "HTTP request latency in seconds");
        });

        Ok(Self { recorder, handle })
    }

    /// Record a finished request.
    pub fn record_request(&self, method: &str, endpoint: &str, status: u16, elapsed: Duration) {
        metrics::with_local_recorder(&self.recorder, || {
            counter!(
                REQUEST_COUNT,
                "method" => method.to_owned(),
                "endpoint" => endpoint.to_owned(),
                "status" => status.to_string()
            )
            .increment(1);

            histogram!(
                REQUEST_LATENCY,
                "method" => method.to_owned(),
                "endpoint" => endpoint.to_owned()
            )
            .record(elapsed.as_secs_f64());
        });
    }

    /// Render the current state in the Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Drain buffered histogram samples into their buckets.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }

    /// Run upkeep every `period` until shutdown.
    pub fn spawn_upkeep(
        self: Arc<Self>,
        period: Duration,
        shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let stop = shutdown.recv();
            tokio::pin!(stop);

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = interval.tick() => self.run_upkeep(),
                }
            }
            tracing::debug!("Metrics upkeep stopped");
        })
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}
