//! HTTP gateway: merges every subrouter and attaches the shared state.

use axum::Router;

use crate::IngestService;

mod error;
mod health;
mod ingest;

// ---

pub fn router(service: IngestService) -> Router {
    // ---
    Router::new()
        .merge(ingest::router())
        .merge(health::router())
        .with_state(service)
}
