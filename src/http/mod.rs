//! HTTP surface: redirects, control endpoints and the media server proxy

pub mod handlers;
pub mod protocol;
pub mod proxy;
pub mod rewrite;
pub mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::HashIndex;
use crate::source::SourceRegistry;

pub use proxy::Upstream;
pub use rewrite::ResponseRewriter;
pub use routes::create_router;

/// Shared state of every handler
pub struct AppState {
    pub registry: Arc<SourceRegistry>,
    pub index: Arc<HashIndex>,
    pub upstream: Upstream,
    pub rewriter: ResponseRewriter,
    /// Source serving `/library/parts/...`
    pub default_source: Option<String>,
    pub snapshot_file: PathBuf,
}

impl AppState {
    pub fn new(
        registry: Arc<SourceRegistry>,
        index: Arc<HashIndex>,
        upstream: Upstream,
        default_source: Option<String>,
        snapshot_file: PathBuf,
    ) -> Self {
        let rewriter = ResponseRewriter::new(Arc::clone(&registry), Arc::clone(&index));
        Self {
            registry,
            index,
            upstream,
            rewriter,
            default_source,
            snapshot_file,
        }
    }
}
