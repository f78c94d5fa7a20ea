//! Backend capability contract
//!
//! A provider adapter only has to authenticate, list its files and issue
//! short-lived download URLs. Inventory, mappings, retry and persistence are
//! handled once for every provider by [`super::BackendSource`].

use std::time::Duration;

use async_trait::async_trait;

use super::context::Credentials;
use super::errors::Result;
use crate::cache::{CacheItem, Hashes};

/// A leaf file as listed by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub id: String,
    /// Digests the backend declares for the file, already normalized
    pub hashes: Hashes,
    pub path: String,
}

impl RemoteFile {
    pub fn new(id: impl Into<String>, hashes: Hashes, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hashes,
            path: path.into(),
        }
    }
}

impl From<RemoteFile> for CacheItem {
    fn from(file: RemoteFile) -> Self {
        CacheItem::new(file.id, file.hashes, file.path)
    }
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Type tag used in persisted contexts
    const KIND: &'static str;

    type Credentials: Credentials;

    /// Exchange the long-lived credential for a fresh session.
    ///
    /// Replaces any previous session. Fails with `AuthError`.
    async fn authenticate(&self, credentials: &Self::Credentials) -> Result<()>;

    /// Every leaf file under the backend root, directories expanded
    async fn list_all_files(&self) -> Result<Vec<RemoteFile>>;

    /// A URL that downloads `item` without further credentials for about `ttl`.
    ///
    /// Fails with `AuthExpired` when the session must be renewed first.
    async fn issue_download_url(&self, item: &CacheItem, ttl: Duration) -> Result<String>;
}
