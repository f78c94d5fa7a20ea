//! Cache sources
//!
//! A source is one named cloud backend together with its cached inventory and
//! the request-key -> item mapping table built from observed traffic.

pub mod adapter;
pub mod backend;
pub mod context;
pub mod errors;
pub mod registry;
pub mod retry;

#[cfg(test)]
pub mod testing;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::cache::{CacheItem, Hashes};

pub use adapter::BackendSource;
pub use backend::{Backend, RemoteFile};
pub use context::{ContextStore, Credentials, SourceContext};
pub use errors::{Result, SourceError};
pub use registry::SourceRegistry;

/// Shared collaborators handed to every source at construction
#[derive(Clone)]
pub struct SourceDeps {
    /// HTTP client used by provider clients
    pub http: reqwest::Client,
    /// Where refreshed contexts are persisted
    pub contexts: Arc<ContextStore>,
    /// Lifetime requested for issued download URLs
    pub url_ttl: Duration,
    /// How long an issued URL may be handed out again (zero disables reuse)
    pub url_cache_ttl: Duration,
}

/// Point-in-time summary of one source
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub cached_files: usize,
    pub mapped_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh_time: Option<DateTime<Utc>>,
    pub url_cache_hits: u64,
    pub url_cache_misses: u64,
}

/// One named cloud backend with its inventory and mapping table
#[async_trait]
pub trait CacheSource: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> &str;

    /// Decode the persisted context, hydrate the inventory it carries and
    /// authenticate
    async fn restore(&self, context: &SourceContext) -> Result<()>;

    /// List the backend and replace the inventory; returns the new inventory
    async fn refresh_source(&self) -> Result<Vec<CacheItem>>;

    /// Replace the inventory from a snapshot without contacting the backend
    fn restore_source(&self, items: Vec<CacheItem>);

    /// Map `request_key` to the first inventory item matching `hashes`
    fn mapping_file(&self, request_key: &str, local_name: &str, hashes: &Hashes) -> Result<()>;

    /// Resolve a mapped request key to a time-limited download URL
    async fn get_url(&self, request_key: &str) -> Result<String>;

    fn has_mapping(&self, request_key: &str) -> bool;

    fn cached_file_size(&self) -> usize;

    fn mapped_file_size(&self) -> usize;

    /// Current inventory, in backend listing order
    fn inventory(&self) -> Vec<CacheItem>;

    /// Context to persist for this source, including the current inventory.
    ///
    /// Fails with `Persistence` before the source was ever restored.
    fn context(&self) -> Result<SourceContext>;

    fn status(&self) -> SourceStatus;
}
