//! Reverse proxy to the upstream media server

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error};

use super::protocol::ErrorResponse;
use super::rewrite::ResponseRewriter;

/// Connection-scoped headers that must not be forwarded
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, thiserror::Error)]
#[error("Upstream request failed: {0}")]
pub struct ProxyError(#[from] reqwest::Error);

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Upstream unreachable");
        (StatusCode::BAD_GATEWAY, Json(ErrorResponse::new(self))).into_response()
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// The upstream media server
#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
}

impl Upstream {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send `request` to the same path and query on the upstream
    async fn send(&self, request: Request) -> Result<reqwest::Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base_url, path_and_query);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        debug!(method = %parts.method, url = %url, "Forwarding to upstream");
        let mut builder = self.client.request(parts.method.clone(), &url).headers(headers);
        if parts.method != Method::GET && parts.method != Method::HEAD {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        Ok(builder.send().await?)
    }

    /// Forward `request` and stream the upstream response back unchanged
    pub async fn forward(&self, request: Request) -> Result<Response, ProxyError> {
        let upstream = self.send(request).await?;
        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Forward `request`, buffer the response and pass it through `rewriter`
    pub async fn forward_rewritten(
        &self,
        request: Request,
        rewriter: &ResponseRewriter,
    ) -> Result<Response, ProxyError> {
        let upstream = self.send(request).await?;
        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        let body = upstream.bytes().await?;

        let body = if status.is_success() {
            let encoding = headers
                .get(header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            rewriter.rewrite(encoding.as_deref(), body).await
        } else {
            body
        };

        headers.insert(header::CONTENT_LENGTH, body.len().into());
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
