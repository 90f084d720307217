//! Read-only REST view over a loaded model.
//!
//! Provides four GET endpoints:
//! - `/summary`: entity counts, object types, modules and the clock
//! - `/objects/{object_type}`: every object of one type
//! - `/objects/{object_type}/{name}`: one named object
//! - `/glm`: the model rendered as text

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::manager::GlmManager;

/// Immutable application state shared across all request handlers.
///
/// Built once the model has been prepared and wrapped in `Arc`; the
/// manager is never mutated while serving, so no lock is needed.
pub struct AppState {
    pub manager: GlmManager,
}

impl AppState {
    pub fn new(manager: GlmManager) -> Self {
        Self { manager }
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/summary", get(handlers::get_summary))
        .route("/objects/{object_type}", get(handlers::get_objects))
        .route("/objects/{object_type}/{name}", get(handlers::get_object))
        .route("/glm", get(handlers::get_glm))
        .with_state(state)
}

/// Binds to the given address and serves the API until the server stops.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind to `addr` or the
/// server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
