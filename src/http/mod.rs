//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, graceful shutdown, config reload)
//!     → request.rs (assign/propagate x-request-id)
//!     → middleware/instrument.rs (span, timing, metrics, access log)
//!     → handlers.rs (demo endpoints)
//!     → Send to client
//!
//! /metrics bypasses the instrumented pipeline.
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod server;

pub use error::{AppError, HandlerFault};
pub use handlers::AppState;
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
