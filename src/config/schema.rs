//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,

    /// Metrics registry and exposition settings.
    pub metrics: MetricsConfig,

    /// Span export settings.
    pub tracing: TracingConfig,

    /// Demo handler tuning (reloadable).
    pub demo: DemoConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout in seconds. Disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_secs: Option<u64>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    #[default]
    Json,
    /// Human-readable output for local development.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Output format for log records.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve the exposition endpoint.
    pub enabled: bool,

    /// Path of the exposition endpoint.
    pub path: String,

    /// Upper bounds (seconds) of the latency histogram buckets.
    pub latency_buckets: Vec<f64>,
}

/// Prometheus client default buckets.
pub const DEFAULT_LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
            latency_buckets: DEFAULT_LATENCY_BUCKETS.to_vec(),
        }
    }
}

/// Span export configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TracingConfig {
    /// Export spans to the collector.
    pub enabled: bool,

    /// Service identity attached to every exported span.
    pub service_name: String,

    /// Zipkin v2 JSON endpoint of the trace collector.
    pub collector_endpoint: String,

    /// Closed spans waiting for export; spans beyond this are dropped.
    pub queue_capacity: usize,

    /// Spans per export request.
    pub max_batch_size: usize,

    /// Flush interval for partial batches in milliseconds.
    pub flush_interval_ms: u64,

    /// Upper bound for a single export request in milliseconds.
    pub export_timeout_ms: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "monitoring-demo".to_string(),
            collector_endpoint: "http://localhost:9411/api/v2/spans".to_string(),
            queue_capacity: 2048,
            max_batch_size: 512,
            flush_interval_ms: 5000,
            export_timeout_ms: 10_000,
        }
    }
}

/// Demo handler tuning.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Lower bound of the random delay applied by `GET /`.
    pub root_delay_min_ms: u64,

    /// Upper bound of the random delay applied by `GET /`.
    pub root_delay_max_ms: u64,

    /// Lower bound of the random delay applied by `GET /api/data`.
    pub data_delay_min_ms: u64,

    /// Upper bound of the random delay applied by `GET /api/data`.
    pub data_delay_max_ms: u64,

    /// Probability in [0, 1] that `GET /api/data` fails.
    pub data_error_rate: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            root_delay_min_ms: 0,
            root_delay_max_ms: 100,
            data_delay_min_ms: 100,
            data_delay_max_ms: 500,
            data_error_rate: 0.1,
        }
    }
}
