//! Request handlers

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use tracing::{debug, info, warn};

use super::protocol::{parse_mapping_request, ErrorResponse, ReloadResponse, StatusResponse};
use super::AppState;
use crate::source::CacheSource;

/// Request keys of media parts always start with this
const PARTS_PREFIX: &str = "/library/parts/";

fn error(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

/// 307 to the URL `source` issues for `request_key`, or 404
async fn redirect_to(source: &dyn CacheSource, request_key: &str) -> Response {
    match source.get_url(request_key).await {
        Ok(url) => {
            debug!(source = %source.name(), request_key = request_key, "Redirecting to cached file");
            Redirect::temporary(&url).into_response()
        }
        Err(e) => {
            debug!(source = %source.name(), request_key = request_key, error = %e, "Resolution failed");
            error(StatusCode::NOT_FOUND, e)
        }
    }
}

/// GET /cache/{source}/{*key}
pub async fn cache_redirect(
    State(state): State<Arc<AppState>>,
    Path((source_name, key)): Path<(String, String)>,
) -> Response {
    let request_key = format!("/{}", key);
    let Some(source) = state.registry.get_source(&source_name).await else {
        warn!(source = %source_name, "Unknown cache source");
        return error(StatusCode::SERVICE_UNAVAILABLE, format!("source {} is not available", source_name));
    };
    redirect_to(source.as_ref(), &request_key).await
}

/// GET /library/parts/{*key}
///
/// Served from the default source when it maps the part, otherwise proxied
/// to the media server untouched. Without a default source every request
/// is a miss.
pub async fn default_redirect(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    request: Request,
) -> Response {
    let request_key = format!("{}{}", PARTS_PREFIX, key);
    let source = match &state.default_source {
        Some(name) => state.registry.get_source(name).await,
        None => None,
    };

    match source {
        Some(source) if source.has_mapping(&request_key) => {
            redirect_to(source.as_ref(), &request_key).await
        }
        _ => {
            debug!(request_key = %request_key, "Cache miss, proxying to upstream");
            match state.upstream.forward(request).await {
                Ok(response) => response,
                Err(e) => e.into_response(),
            }
        }
    }
}

/// GET /library/sections/... and /library/metadata/...
pub async fn proxy_listing(State(state): State<Arc<AppState>>, request: Request) -> Response {
    match state.upstream.forward_rewritten(request, &state.rewriter).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// Everything else goes to the media server as-is
pub async fn proxy_passthrough(State(state): State<Arc<AppState>>, request: Request) -> Response {
    match state.upstream.forward(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// POST /cache/mapping
pub async fn mapping_file(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match parse_mapping_request(&body) {
        Ok(request) => request,
        Err(e) => return error(StatusCode::BAD_REQUEST, format!("invalid mapping request: {}", e)),
    };

    match state
        .registry
        .mapping_file(&request.req_url, &request.local_name, &request.hashes)
        .await
    {
        Ok(()) => {
            info!(request_key = %request.req_url, local_name = %request.local_name, "Mapping created");
            StatusCode::OK.into_response()
        }
        Err(e) => error(StatusCode::BAD_REQUEST, e),
    }
}

async fn status_response(state: &AppState) -> StatusResponse {
    StatusResponse {
        sources: state.registry.statuses().await,
        hash_index_entries: state.index.len(),
    }
}

/// GET /cache/status
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(status_response(&state).await)
}

/// POST /cache/refresh
pub async fn refresh(State(state): State<Arc<AppState>>) -> Response {
    info!("Refreshing all sources on request");
    match state.registry.refresh_all(&state.snapshot_file).await {
        Ok(()) => Json(status_response(&state).await).into_response(),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// POST /cache/index/reload
pub async fn reload_index(State(state): State<Arc<AppState>>) -> Response {
    match state.index.reload() {
        Ok(entries) => Json(ReloadResponse { entries }).into_response(),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
    }
}
