//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;

use monitoring_demo::config::{DemoConfig, ServiceConfig};
use monitoring_demo::{HttpServer, MetricsRegistry, Shutdown};

/// A running service bound to an ephemeral port.
pub struct TestService {
    pub addr: SocketAddr,
    pub metrics: Arc<MetricsRegistry>,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), std::io::Error>>,
}

impl TestService {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Config with instant, never-failing demo handlers and no span export.
pub fn quiet_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.tracing.enabled = false;
    config.demo = DemoConfig {
        root_delay_min_ms: 0,
        root_delay_max_ms: 0,
        data_delay_min_ms: 0,
        data_delay_max_ms: 0,
        data_error_rate: 0.0,
    };
    config
}

/// Registry and router for driving the service without a socket.
pub fn build_server(config: ServiceConfig) -> (HttpServer, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new(&config.metrics).unwrap());
    (HttpServer::new(config, Arc::clone(&metrics)), metrics)
}

/// Start the service on `127.0.0.1:0`.
pub async fn spawn_service(config: ServiceConfig) -> TestService {
    let (server, metrics) = build_server(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    let (_, config_updates) = mpsc::unbounded_channel();
    let task = tokio::spawn(server.run(listener, config_updates, signal));

    TestService {
        addr,
        metrics,
        shutdown,
        task,
    }
}

/// One sample line of the text exposition format.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Parse sample lines, ignoring comments. Label order is not significant.
pub fn parse_exposition(text: &str) -> Vec<Sample> {
    text.lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_sample)
        .collect()
}

fn parse_sample(line: &str) -> Option<Sample> {
    let (series, value) = line.rsplit_once(' ')?;
    let value = value.parse().ok()?;

    let (name, labels) = match series.split_once('{') {
        Some((name, rest)) => (name, parse_labels(rest.strip_suffix('}')?)),
        None => (series, BTreeMap::new()),
    };

    Some(Sample {
        name: name.to_owned(),
        labels,
        value,
    })
}

fn parse_labels(body: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    let mut rest = body;
    while let Some((key, tail)) = rest.split_once("=\"") {
        let Some(end) = tail.find('"') else {
            break;
        };
        labels.insert(key.trim_start_matches(',').to_owned(), tail[..end].to_owned());
        rest = &tail[end + 1..];
    }
    labels
}

/// Value of the series with exactly these labels, if present.
pub fn sample_value(text: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let wanted: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    parse_exposition(text)
        .into_iter()
        .find(|sample| sample.name == name && sample.labels == wanted)
        .map(|sample| sample.value)
}

/// Request counter value for a series, zero when absent.
pub fn request_count(text: &str, method: &str, endpoint: &str, status: &str) -> f64 {
    sample_value(
        text,
        "http_request_count_total",
        &[("method", method), ("endpoint", endpoint), ("status", status)],
    )
    .unwrap_or(0.0)
}

/// Latency observation count for a series, zero when absent.
pub fn latency_count(text: &str, method: &str, endpoint: &str) -> f64 {
    sample_value(
        text,
        "http_request_latency_seconds_count",
        &[("method", method), ("endpoint", endpoint)],
    )
    .unwrap_or(0.0)
}

/// In-memory log sink for `tracing_subscriber::fmt`.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Every JSON record written so far.
    pub fn records(&self) -> Vec<serde_json::Value> {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Records whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<serde_json::Value> {
        self.records()
            .into_iter()
            .filter(|record| record["message"] == message)
            .collect()
    }
}

pub struct CapturedWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}
