//! Spans produced by the pipeline and the export failure policy.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures_util::future::BoxFuture;
use opentelemetry::trace::{SpanId, SpanKind, Status, TraceError, TracerProvider as _};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::trace::TracerProvider;
use tower::ServiceExt;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use monitoring_demo::observability::span_export::{export_filter, LoggedExporter};

mod common;

#[derive(Clone, Debug, Default)]
struct Collecting {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl SpanExporter for Collecting {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.spans.lock().unwrap().extend(batch);
        Box::pin(async { Ok(()) })
    }
}

/// Answers each export from a script of outcomes and counts the calls.
#[derive(Debug)]
struct Scripted {
    outcomes: VecDeque<ExportResult>,
    calls: Arc<Mutex<usize>>,
}

impl SpanExporter for Scripted {
    fn export(&mut self, _batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        *self.calls.lock().unwrap() += 1;
        let outcome = self.outcomes.pop_front().unwrap_or(Ok(()));
        Box::pin(async move { outcome })
    }
}

fn attribute(span: &SpanData, key: &str) -> Option<String> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.to_string())
}

fn named<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
    spans
        .iter()
        .find(|span| span.name == name)
        .unwrap_or_else(|| panic!("span `{name}` exported"))
}

async fn exported_spans(uri: &str, error_rate: f64) -> (StatusCode, Vec<SpanData>) {
    let exporter = Collecting::default();
    let spans = Arc::clone(&exporter.spans);
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter)
        .build();

    let otel = tracing_opentelemetry::layer()
        .with_tracer(provider.tracer("monitoring-demo"))
        .with_filter(export_filter());
    let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(otel));

    let mut config = common::quiet_config();
    config.demo.data_error_rate = error_rate;
    let (server, _metrics) = common::build_server(config);
    let response = server
        .router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    drop(guard);
    let spans = spans.lock().unwrap().clone();
    (response.status(), spans)
}

#[tokio::test]
async fn request_span_is_server_root_with_handler_child() {
    let (status, spans) = exported_spans("/api/data", 0.0).await;
    assert_eq!(status, StatusCode::OK);

    let request = named(&spans, "HTTP GET /api/data");
    let work = named(&spans, "data_processing");

    assert_eq!(request.span_kind, SpanKind::Server);
    assert_eq!(request.parent_span_id, SpanId::INVALID);
    assert_eq!(attribute(request, "http.method").as_deref(), Some("GET"));
    assert_eq!(attribute(request, "http.route").as_deref(), Some("/api/data"));
    assert_eq!(attribute(request, "http.status_code").as_deref(), Some("200"));
    assert_eq!(attribute(request, "error"), None);
    assert_eq!(attribute(request, "request_id").map(|id| id.len()), Some(36));
    assert_eq!(request.status, Status::Unset);

    assert_eq!(work.span_kind, SpanKind::Internal);
    assert_eq!(work.span_context.trace_id(), request.span_context.trace_id());
    assert_eq!(work.parent_span_id, request.span_context.span_id());
    assert!(work.end_time <= request.end_time);
}

#[tokio::test]
async fn failed_request_span_is_marked_as_error() {
    let (status, spans) = exported_spans("/api/data", 1.0).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let request = named(&spans, "HTTP GET /api/data");
    assert_eq!(attribute(request, "http.status_code").as_deref(), Some("500"));
    assert_eq!(attribute(request, "error").as_deref(), Some("true"));
    assert!(matches!(request.status, Status::Error { .. }));
}

#[tokio::test]
async fn separate_requests_get_separate_traces() {
    let (_, first) = exported_spans("/sleep/1", 0.0).await;
    let (_, second) = exported_spans("/sleep/1", 0.0).await;

    let root = |spans: &[SpanData]| named(spans, "HTTP GET /sleep/{ms}").span_context.trace_id();
    assert_ne!(root(&first), root(&second));
    assert!(first.iter().any(|span| span.name == "sleep"));
}

#[tokio::test]
async fn export_failures_log_once_then_quietly_until_recovery() {
    let logs = common::CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(logs.clone())
            .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG),
    );
    let _guard = tracing::subscriber::set_default(subscriber);

    let calls = Arc::new(Mutex::new(0));
    let mut exporter = LoggedExporter::new(
        Scripted {
            outcomes: VecDeque::from([
                Err(TraceError::from("collector unreachable")),
                Err(TraceError::from("collector unreachable")),
                Ok(()),
                Ok(()),
            ]),
            calls: Arc::clone(&calls),
        },
        Duration::from_secs(1),
    );

    for _ in 0..4 {
        let result = exporter.export(Vec::new()).await;
        assert!(result.is_ok(), "failed batches are dropped, not reported");
    }

    let levels: Vec<_> = logs
        .records()
        .iter()
        .filter(|record| {
            record["target"]
                .as_str()
                .is_some_and(|target| target.starts_with("monitoring_demo"))
        })
        .map(|record| {
            (
                record["level"].as_str().unwrap_or_default().to_owned(),
                record["message"].as_str().unwrap_or_default().to_owned(),
            )
        })
        .collect();
    assert_eq!(
        levels,
        [
            ("WARN", "Span export failed, dropping batch"),
            ("DEBUG", "Span export still failing"),
            ("INFO", "Span export recovered"),
        ]
        .map(|(level, message)| (level.to_owned(), message.to_owned()))
    );

    let warned = logs.with_message("Span export failed, dropping batch");
    assert!(warned[0]["error"]
        .as_str()
        .is_some_and(|error| error.contains("collector unreachable")));

    // Every batch was attempted exactly once.
    assert_eq!(*calls.lock().unwrap(), 4);
}

#[tokio::test]
async fn slow_exports_time_out_and_count_as_failures() {
    let logs = common::CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(logs.clone()),
    );
    let _guard = tracing::subscriber::set_default(subscriber);

    #[derive(Debug)]
    struct Hanging;
    impl SpanExporter for Hanging {
        fn export(&mut self, _batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
            Box::pin(futures_util::future::pending())
        }
    }

    let mut exporter = LoggedExporter::new(Hanging, Duration::from_millis(20));
    let result = tokio::time::timeout(Duration::from_secs(1), exporter.export(Vec::new()))
        .await
        .expect("export bounded by its timeout");
    assert!(result.is_ok());
    assert_eq!(logs.with_message("Span export failed, dropping batch").len(), 1);
}
