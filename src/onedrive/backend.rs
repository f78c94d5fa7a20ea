//! OneDrive for Business as a cache backend

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::OneDriveClient;
use crate::cache::CacheItem;
use crate::source::context::require;
use crate::source::{Backend, Credentials, RemoteFile, Result, SourceError};

/// Persisted app registration and drive owner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneDriveCredentials {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub tenant_id: String,
    /// User principal name or id owning the drive
    #[serde(default)]
    pub user: String,
}

impl Credentials for OneDriveCredentials {
    fn validate(&self) -> Result<()> {
        require("clientId", &self.client_id)?;
        require("clientSecret", &self.client_secret)?;
        require("tenantId", &self.tenant_id)?;
        require("user", &self.user)
    }
}

pub struct OneDriveBackend {
    client: OneDriveClient,
}

impl OneDriveBackend {
    pub fn new(client: OneDriveClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Backend for OneDriveBackend {
    const KIND: &'static str = "OneDriveForBusiness";

    type Credentials = OneDriveCredentials;

    async fn authenticate(&self, credentials: &OneDriveCredentials) -> Result<()> {
        self.client
            .authorize(
                &credentials.client_id,
                &credentials.client_secret,
                &credentials.tenant_id,
                &credentials.user,
            )
            .await
            .map_err(|e| SourceError::AuthError(e.to_string()))
    }

    async fn list_all_files(&self) -> Result<Vec<RemoteFile>> {
        let items = self.client.list_files_recursive().await?;
        debug!(count = items.len(), "OneDrive files listed");
        Ok(items
            .into_iter()
            .map(|item| {
                let hashes = item.hashes();
                let path = item.full_path();
                RemoteFile::new(item.id, hashes, path)
            })
            .collect())
    }

    /// The service picks the URL lifetime; `ttl` is not sent
    async fn issue_download_url(&self, item: &CacheItem, _ttl: Duration) -> Result<String> {
        let drive_item = self.client.get_item(&item.item_id).await?;
        drive_item.download_url.ok_or_else(|| {
            SourceError::BackendUnavailable(format!("no download URL for item {}", item.item_id))
        })
    }
}
