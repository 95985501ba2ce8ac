//! Instrumented request pipeline.
//!
//! # Responsibilities
//! - Time every request and label it with its matched route template
//! - Run the handler inside a request span so handler spans nest under it
//! - Record exactly one counter increment, latency observation and access
//!   log record per request, on every exit path
//!
//! # Design Decisions
//! - Bookkeeping lives in `Drop` of [`RequestRecord`]: completion, handler
//!   error, panic and cancellation all finalize through the same path
//! - Panics are caught only to be observed, then resumed unchanged
//! - Unmatched paths share one label to keep series count bounded

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use futures_util::FutureExt;
use tracing::{field::Empty, Instrument, Span};

use crate::http::error::HandlerFault;
use crate::http::request::RequestIdExt;
use crate::observability::MetricsRegistry;

/// Route label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "<unmatched>";

/// Status recorded when the request future is dropped before completion.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Route template of the request, never the raw path.
pub fn route_label<B>(request: &axum::http::Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_owned())
}

enum Outcome {
    Completed {
        status: StatusCode,
        fault: Option<HandlerFault>,
    },
    Panicked(String),
}

/// Per-request bookkeeping, finalized when dropped.
struct RequestRecord {
    metrics: Arc<MetricsRegistry>,
    method: Method,
    route: String,
    uri: String,
    request_id: String,
    span: Span,
    start: Instant,
    outcome: Option<Outcome>,
}

impl RequestRecord {
    fn status(&self) -> u16 {
        match &self.outcome {
            Some(Outcome::Completed { status, .. }) => status.as_u16(),
            Some(Outcome::Panicked(_)) => StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            None => CLIENT_CLOSED_REQUEST,
        }
    }
}

impl Drop for RequestRecord {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let status = self.status();
        let latency = elapsed.as_secs_f64();

        self.metrics
            .record_request(self.method.as_str(), &self.route, status, elapsed);

        self.span.record("http.status_code", status);
        if status >= 500 {
            self.span.record("error", true);
            self.span.record("otel.status_code", "error");
        }
        let _entered = self.span.enter();

        match self.outcome.take() {
            Some(Outcome::Completed {
                fault: Some(fault), ..
            }) => tracing::error!(
                path = %self.route,
                method = %self.method,
                status,
                error = %fault.message,
                detail = %fault.detail,
                "Handler failed"
            ),
            Some(Outcome::Panicked(message)) => tracing::error!(
                path = %self.route,
                method = %self.method,
                status,
                panic = %message,
                "Handler panicked"
            ),
            None => tracing::warn!(
                path = %self.route,
                method = %self.method,
                "Request dropped before completion"
            ),
            Some(Outcome::Completed { fault: None, .. }) => {}
        }

        tracing::info!(
            path = %self.route,
            method = %self.method,
            status,
            latency,
            uri = %self.uri,
            request_id = %self.request_id,
            "request completed"
        );
    }
}

/// Middleware wrapping every routed request with metrics, logging and tracing.
///
/// Install with `axum::middleware::from_fn_with_state(registry, instrument)`
/// via `Router::layer` so the matched route is known.
pub async fn instrument(
    State(metrics): State<Arc<MetricsRegistry>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let route = route_label(&request);
    let uri = request.uri().path().to_owned();
    let request_id = request.request_id().unwrap_or("unknown").to_owned();

    let span = tracing::info_span!(
        "http_request",
        otel.name = %format!("HTTP {} {}", method, route),
        otel.kind = "server",
        http.method = %method,
        http.route = %route,
        http.status_code = Empty,
        otel.status_code = Empty,
        error = Empty,
        request_id = %request_id,
    );

    let mut record = RequestRecord {
        metrics,
        method,
        route,
        uri,
        request_id,
        span: span.clone(),
        start: Instant::now(),
        outcome: None,
    };

    let result = AssertUnwindSafe(next.run(request))
        .catch_unwind()
        .instrument(span)
        .await;

    match result {
        Ok(mut response) => {
            let fault = response.extensions_mut().remove::<HandlerFault>();
            record.outcome = Some(Outcome::Completed {
                status: response.status(),
                fault,
            });
            drop(record);
            response
        }
        Err(panic) => {
            record.outcome = Some(Outcome::Panicked(panic_message(&*panic)));
            drop(record);
            std::panic::resume_unwind(panic)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
