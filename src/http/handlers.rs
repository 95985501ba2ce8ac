//! Demo endpoints and the metrics exposition endpoint.
//!
//! The demo endpoints exist to generate observable load with varying latency
//! and an occasional fault. Each opens a child span for its simulated work.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;

use crate::config::DemoConfig;
use crate::http::error::AppError;
use crate::observability::metrics::EXPOSITION_CONTENT_TYPE;
use crate::observability::MetricsRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsRegistry>,
    pub demo: Arc<ArcSwap<DemoConfig>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SleepResponse {
    pub slept_ms: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DataResponse {
    pub data: Vec<u32>,
}

/// Duration slept for a requested millisecond value; negatives clamp to zero.
pub fn sleep_duration(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

fn random_delay(min_ms: u64, max_ms: u64) -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms.max(min_ms)))
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let delay = {
        let demo = state.demo.load();
        random_delay(demo.root_delay_min_ms, demo.root_delay_max_ms)
    };

    tokio::time::sleep(delay)
        .instrument(tracing::info_span!(
            "simulated_work",
            delay_ms = delay.as_millis() as u64
        ))
        .await;

    Json(RootResponse {
        message: "Welcome to the monitoring demo".to_string(),
    })
}

/// `GET /sleep/{ms}`
pub async fn sleep(Path(ms): Path<i64>) -> Json<SleepResponse> {
    tokio::time::sleep(sleep_duration(ms))
        .instrument(tracing::info_span!("sleep", requested_ms = ms))
        .await;

    Json(SleepResponse { slept_ms: ms })
}

/// `GET /api/data`
pub async fn data(State(state): State<AppState>) -> Result<Json<DataResponse>, AppError> {
    let (delay, fail) = {
        let demo = state.demo.load();
        let fail = rand::thread_rng().gen_bool(demo.data_error_rate.clamp(0.0, 1.0));
        (random_delay(demo.data_delay_min_ms, demo.data_delay_max_ms), fail)
    };

    async move {
        tokio::time::sleep(delay).await;
        if fail {
            return Err(AppError::Processing("random error occurred".to_string()));
        }
        Ok(Json(DataResponse {
            data: vec![1, 2, 3, 4, 5],
        }))
    }
    .instrument(tracing::info_span!(
        "data_processing",
        delay_ms = delay.as_millis() as u64
    ))
    .await
}

/// Fallback for unmatched paths.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not Found" })))
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.metrics.render(),
    )
}
