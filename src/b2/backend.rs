//! B2 as a cache backend

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::B2Client;
use crate::cache::CacheItem;
use crate::source::context::require;
use crate::source::{Backend, Credentials, RemoteFile, Result, SourceError};

/// Persisted B2 credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct B2Credentials {
    #[serde(default)]
    pub application_key_id: String,
    #[serde(default)]
    pub application_key: String,
    #[serde(default)]
    pub bucket_name: String,
    /// Only files under this prefix are cached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_prefix: Option<String>,
}

impl Credentials for B2Credentials {
    fn validate(&self) -> Result<()> {
        require("applicationKeyId", &self.application_key_id)?;
        require("applicationKey", &self.application_key)?;
        require("bucketName", &self.bucket_name)
    }
}

pub struct B2Backend {
    client: B2Client,
    root_prefix: RwLock<Option<String>>,
}

impl B2Backend {
    pub fn new(client: B2Client) -> Self {
        Self {
            client,
            root_prefix: RwLock::new(None),
        }
    }
}

#[async_trait]
impl Backend for B2Backend {
    const KIND: &'static str = "B2";

    type Credentials = B2Credentials;

    async fn authenticate(&self, credentials: &B2Credentials) -> Result<()> {
        self.client
            .authorize(
                &credentials.application_key_id,
                &credentials.application_key,
                &credentials.bucket_name,
            )
            .await
            .map_err(|e| SourceError::AuthError(e.to_string()))?;
        *self.root_prefix.write().unwrap_or_else(PoisonError::into_inner) =
            credentials.root_prefix.clone().filter(|p| !p.is_empty());
        Ok(())
    }

    async fn list_all_files(&self) -> Result<Vec<RemoteFile>> {
        let prefix = self
            .root_prefix
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let files = self.client.list_file_names(prefix.as_deref()).await?;
        let total = files.len();

        let leaves: Vec<RemoteFile> = files
            .into_iter()
            .filter(|f| f.is_leaf())
            .filter_map(|f| {
                let hashes = f.hashes();
                let id = f.file_id?;
                Some(RemoteFile::new(id, hashes, f.file_name))
            })
            .collect();
        debug!(listed = total, leaves = leaves.len(), "B2 listing filtered to leaf files");
        Ok(leaves)
    }

    async fn issue_download_url(&self, item: &CacheItem, ttl: Duration) -> Result<String> {
        Ok(self.client.download_url(&item.cached_path, ttl).await?)
    }
}
