//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, instrumentation, optional timeout, panic translation)
//! - Serve until the shutdown signal, draining in-flight requests
//! - Apply reloaded demo settings while running

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

use crate::config::{DemoConfig, ServiceConfig};
use crate::http::handlers::{self, AppState};
use crate::http::middleware::instrument;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::ShutdownSignal;
use crate::observability::MetricsRegistry;

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server recording into the given registry.
    pub fn new(config: ServiceConfig, metrics: Arc<MetricsRegistry>) -> Self {
        let state = AppState {
            metrics,
            demo: Arc::new(ArcSwap::from_pointee(config.demo.clone())),
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layer order, outermost first: request ID, panic translation,
    /// instrumentation, timeout, handler. The metrics route is added after the
    /// instrumentation layer, so scrapes are not counted.
    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let mut app = Router::new()
            .route("/", get(handlers::root))
            .route("/sleep/{ms}", get(handlers::sleep))
            .route("/api/data", get(handlers::data))
            .fallback(handlers::not_found);

        if let Some(secs) = config.timeouts.request_secs {
            app = app.layer(TimeoutLayer::new(Duration::from_secs(secs)));
        }

        app = app.layer(middleware::from_fn_with_state(
            Arc::clone(&state.metrics),
            instrument,
        ));

        if config.metrics.enabled {
            app = app.route(&config.metrics.path, get(handlers::metrics));
        }

        app.with_state(state)
            .layer(CatchPanicLayer::new())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// Router with all layers, for serving or driving directly in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ServiceConfig>,
        shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload = tokio::spawn(apply_config_updates(
            config_updates,
            self.config,
            Arc::clone(&self.state.demo),
        ));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.recv())
            .await?;

        reload.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Swap in the demo section of each reloaded config.
async fn apply_config_updates(
    mut updates: mpsc::UnboundedReceiver<ServiceConfig>,
    mut current: ServiceConfig,
    demo: Arc<ArcSwap<DemoConfig>>,
) {
    while let Some(new_config) = updates.recv().await {
        if new_config.demo != current.demo {
            demo.store(Arc::new(new_config.demo.clone()));
            tracing::info!(demo = ?new_config.demo, "Demo settings reloaded");
        }

        let mut restart_only = new_config.clone();
        restart_only.demo = current.demo.clone();
        if restart_only != current {
            tracing::warn!("Reloaded config changes settings that need a restart; ignoring them");
        }

        current.demo = new_config.demo;
    }
}
