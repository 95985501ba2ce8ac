//! Handler faults.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors a handler can fail with. Every variant maps to 500.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("data processing failed: {0}")]
    Processing(String),
}

/// Fault detail attached to a failed response for the request pipeline.
#[derive(Debug, Clone)]
pub struct HandlerFault {
    pub message: String,
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let fault = HandlerFault {
            message: self.to_string(),
            detail: format!("{self:?}"),
        };

        let mut response = (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "Internal Server Error" })),
        )
            .into_response();
        response.extensions_mut().insert(fault);
        response
    }
}
