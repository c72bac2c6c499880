//! `depgraph-server`: discovers per-language crawler executables, runs them
//! sequentially against configured repo roots, merges and classifies the
//! result, and serves it over a small local HTTP surface (spec §5, §6).

pub mod api;
pub mod discovery;
pub mod init;
pub mod orchestrate;
pub mod state;
pub mod watch;

use axum::routing::{get, post};
use axum::Router;
use state::AppContext;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the HTTP router, factored out so integration tests can drive it
/// with `tower::ServiceExt::oneshot` without binding a real socket.
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/repos", get(api::list_repos))
        .route("/api/graph/{name}", get(api::get_graph))
        .route("/api/crawl/{name}", post(api::crawl_repo))
        .route("/api/reset/{name}", post(api::reset_repo))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
