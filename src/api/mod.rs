//! HTTP API of the agent
//!
//! Service control lives under `/services`; `/status` and `/health` describe
//! the agent itself.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::{
    health_handler, list_services_handler, service_start_handler, service_stop_handler,
    status_handler,
};

/// Routes that drive the service manager
fn service_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_services_handler))
        .route("/:name/start", post(service_start_handler))
        .route("/:name/stop", post(service_stop_handler))
}

/// Build the agent router around the shared state
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/services", service_routes())
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
