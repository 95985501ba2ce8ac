//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buckets increasing, rates within [0, 1])
//! - Detect route conflicts between the metrics endpoint and demo routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system (startup and reload)

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("observability.log_level `{0}` is not one of trace, debug, info, warn, error")]
    LogLevel(String),

    #[error("metrics.path `{0}` must be a static path starting with `/`")]
    MetricsPath(String),

    #[error("metrics.path `{0}` collides with a service route")]
    MetricsPathConflict(String),

    #[error("metrics.latency_buckets {0}")]
    LatencyBuckets(&'static str),

    #[error("tracing.service_name must not be empty")]
    ServiceName,

    #[error("tracing.collector_endpoint `{0}` is not an http(s) URL")]
    CollectorEndpoint(String),

    #[error("tracing.{0} must be greater than zero")]
    ZeroExportSetting(&'static str),

    #[error("demo.{field}_min_ms ({min}) exceeds demo.{field}_max_ms ({max})")]
    DelayRange {
        field: &'static str,
        min: u64,
        max: u64,
    },

    #[error("demo.data_error_rate {0} is outside [0, 1]")]
    ErrorRate(f64),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.timeouts.request_secs == Some(0) {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(
            config.observability.log_level.clone(),
        ));
    }

    validate_metrics(config, &mut errors);
    validate_tracing(config, &mut errors);

    let demo = &config.demo;
    if demo.root_delay_min_ms > demo.root_delay_max_ms {
        errors.push(ValidationError::DelayRange {
            field: "root_delay",
            min: demo.root_delay_min_ms,
            max: demo.root_delay_max_ms,
        });
    }
    if demo.data_delay_min_ms > demo.data_delay_max_ms {
        errors.push(ValidationError::DelayRange {
            field: "data_delay",
            min: demo.data_delay_min_ms,
            max: demo.data_delay_max_ms,
        });
    }
    if !(0.0..=1.0).contains(&demo.data_error_rate) {
        errors.push(ValidationError::ErrorRate(demo.data_error_rate));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_metrics(config: &ServiceConfig, errors: &mut Vec<ValidationError>) {
    let metrics = &config.metrics;

    let path = metrics.path.as_str();
    let dynamic_segment = path.split('/').any(|segment| segment.starts_with(':'));
    if !path.starts_with('/') || path.contains(['{', '}', '*']) || dynamic_segment {
        errors.push(ValidationError::MetricsPath(metrics.path.clone()));
    } else if path == "/" || path == "/api/data" || path.starts_with("/sleep/") {
        errors.push(ValidationError::MetricsPathConflict(metrics.path.clone()));
    }

    let buckets = &metrics.latency_buckets;
    if buckets.is_empty() {
        errors.push(ValidationError::LatencyBuckets("must not be empty"));
    } else if buckets.iter().any(|b| !b.is_finite() || *b < 0.0) {
        errors.push(ValidationError::LatencyBuckets(
            "must be finite and non-negative",
        ));
    } else if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
        errors.push(ValidationError::LatencyBuckets("must be strictly increasing"));
    }
}

fn validate_tracing(config: &ServiceConfig, errors: &mut Vec<ValidationError>) {
    let tracing = &config.tracing;

    if tracing.service_name.trim().is_empty() {
        errors.push(ValidationError::ServiceName);
    }

    let endpoint_ok = reqwest::Url::parse(&tracing.collector_endpoint)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !endpoint_ok {
        errors.push(ValidationError::CollectorEndpoint(
            tracing.collector_endpoint.clone(),
        ));
    }

    if tracing.queue_capacity == 0 {
        errors.push(ValidationError::ZeroExportSetting("queue_capacity"));
    }
    if tracing.max_batch_size == 0 {
        errors.push(ValidationError::ZeroExportSetting("max_batch_size"));
    }
    if tracing.flush_interval_ms == 0 {
        errors.push(ValidationError::ZeroExportSetting("flush_interval_ms"));
    }
    if tracing.export_timeout_ms == 0 {
        errors.push(ValidationError::ZeroExportSetting("export_timeout_ms"));
    }
}
