//! Operator HTTP surface (C9, §4.5/§10.4). Built on axum, following the
//! canceler's `server.rs` shape: a `Router` built once from a cloneable
//! `AppState`, plain handler functions, no middleware framework beyond
//! what axum itself provides.

mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use bridge_core::orchestrator::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/transfers", get(handlers::list_transfers))
        .route("/transfers/{id}/retry", post(handlers::retry_transfer))
        .route("/finalizations", get(handlers::list_finalizations))
        .route("/finalizations/{block}/finalize", post(handlers::force_finalize))
        .route("/safety/halt", post(handlers::halt))
        .route("/safety/unhalt", post(handlers::unhalt))
        .route("/safety/blocklist", post(handlers::blocklist))
        .route("/safety/allowlist", post(handlers::allowlist))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}
