//! HTTP server setup and routing

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::carousel::CarouselRegistry;
use crate::commands::CommandRouter;
use crate::error::{Error, Result};
use crate::reconciler::{InboundSender, StatusReconciler};
use crate::state::SharedState;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub commands: Arc<CommandRouter>,
    pub carousels: Arc<CarouselRegistry>,
    pub reconciler: Arc<StatusReconciler>,
    /// Injection point for events from the stream-acquisition side
    pub inbound: InboundSender,
}

/// Build the router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/status", get(super::handlers::get_status))
        .route("/commands", post(super::handlers::run_command))
        .route(
            "/carousels/:id/:direction",
            post(super::handlers::navigate_carousel),
        )
        .route(
            "/events",
            get(super::sse::event_stream).post(super::handlers::inject_event),
        )
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the HTTP server until `shutdown` resolves
pub async fn run(
    bind_addr: &str,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid bind address {}: {}", bind_addr, e)))?;

    let app = create_router(ctx);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
