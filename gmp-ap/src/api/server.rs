//! HTTP server setup and routing
//!
//! Sets up the Axum router with session control endpoints and SSE.

use crate::error::{Error, Result};
use crate::playback::PlaybackEngine;
use axum::{
    routing::{get, post},
    Router,
};
use gmp_common::EventBus;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<PlaybackEngine>,
    pub event_bus: EventBus,
}

/// Build the router
pub fn create_router(ctx: AppContext) -> Router {
    let sessions = Router::new()
        .route("/", get(super::handlers::list_sessions))
        .route("/:tenant_id/state", get(super::handlers::get_state))
        .route("/:tenant_id/channels", get(super::handlers::list_channels))
        .route("/:tenant_id/join", post(super::handlers::join))
        .route("/:tenant_id/enqueue", post(super::handlers::enqueue))
        .route("/:tenant_id/skip", post(super::handlers::skip))
        .route("/:tenant_id/stop", post(super::handlers::stop))
        .route("/:tenant_id/pause", post(super::handlers::pause))
        .route("/:tenant_id/resume", post(super::handlers::resume))
        .route("/:tenant_id/seek", post(super::handlers::seek));

    let api = Router::new()
        .route("/search", get(super::handlers::search))
        .route("/events", get(super::sse::event_stream))
        .nest("/sessions", sessions);

    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        .nest("/api/v1", api)
        .with_state(ctx)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Run the HTTP API server until `shutdown` resolves
pub async fn run(
    bind_address: &str,
    port: u16,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid bind address {}:{}: {}", bind_address, port, e)))?;

    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    info!("HTTP server stopped");
    Ok(())
}
