//! Route table and access log

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use super::handlers;
use super::AppState;

/// Create the service router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/cache", cache_routes())
        .merge(library_routes())
        .fallback(handlers::proxy_passthrough)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

fn cache_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mapping", post(handlers::mapping_file))
        .route("/status", get(handlers::status))
        .route("/refresh", post(handlers::refresh))
        .route("/index/reload", post(handlers::reload_index))
        .route("/{source}/{*key}", get(handlers::cache_redirect))
}

fn library_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/library/parts/{*key}", get(handlers::default_redirect))
        .route("/library/sections/{id}", get(handlers::proxy_listing))
        .route("/library/sections/{id}/{*rest}", get(handlers::proxy_listing))
        .route("/library/metadata/{id}", get(handlers::proxy_listing))
        .route("/library/metadata/{id}/{*rest}", get(handlers::proxy_listing))
}

/// One line per request; only the path is logged since media server
/// queries carry access tokens
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}
