//! Backblaze B2 API Client
//!
//! Authorizes an application key against one bucket, lists file names and
//! issues download authorizations for single files.

use base64::Engine;
use reqwest::Client;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use super::errors::B2Error;
use super::types::{
    AuthorizeAccountResponse, DownloadAuthorization, DownloadAuthorizationRequest, FileInfo,
    ListBucketsResponse, ListFileNamesRequest, ListFilesResponse,
};

/// B2 API base URL for authorization (v3 for nested apiInfo structure)
const B2_AUTH_URL: &str = "https://api.backblazeb2.com/b2api/v3/b2_authorize_account";

/// Page size for b2_list_file_names (the API maximum per billed call)
const LIST_PAGE_SIZE: u32 = 1000;

/// Bounds B2 accepts for validDurationInSeconds
const MIN_DOWNLOAD_AUTH_SECS: u64 = 1;
const MAX_DOWNLOAD_AUTH_SECS: u64 = 7 * 24 * 60 * 60;

/// Auth state that can be refreshed (interior mutability)
#[derive(Debug, Clone)]
struct AuthState {
    auth_token: String,
    api_url: String,
    download_url: String,
    bucket_id: String,
    bucket_name: String,
}

/// B2 API client for making authenticated requests
pub struct B2Client {
    /// HTTP client for making requests
    http_client: Client,
    auth_url: String,
    /// None until the first successful `authorize`
    auth_state: RwLock<Option<AuthState>>,
}

impl B2Client {
    pub fn new(http_client: Client) -> Self {
        Self::with_auth_url(http_client, B2_AUTH_URL)
    }

    /// Client that authorizes against a different endpoint
    pub fn with_auth_url(http_client: Client, auth_url: impl Into<String>) -> Self {
        Self {
            http_client,
            auth_url: auth_url.into(),
            auth_state: RwLock::new(None),
        }
    }

    fn state(&self) -> Result<AuthState, B2Error> {
        self.auth_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(B2Error::NotAuthorized)
    }

    /// Authorize with B2 and resolve the bucket to operate on.
    ///
    /// Replaces any previous authorization.
    pub async fn authorize(&self, key_id: &str, key: &str, bucket_name: &str) -> Result<(), B2Error> {
        info!(bucket = bucket_name, "Authorizing with B2 API...");

        // Create Basic Auth header
        let credentials = format!("{}:{}", key_id, key);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        let auth_header = format!("Basic {}", encoded);

        let response = self
            .http_client
            .get(&self.auth_url)
            .header("Authorization", &auth_header)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(match B2Error::from_status(status, &body) {
                B2Error::AuthExpired | B2Error::Forbidden(_) => {
                    B2Error::Unauthorized(format!("B2 authorization failed ({})", status))
                }
                other => other,
            });
        }

        let auth_response: AuthorizeAccountResponse = response.json().await?;
        let api_url = auth_response.api_info.storage_api.api_url;
        let download_url = auth_response.api_info.storage_api.download_url;
        debug!(api_url = %api_url, download_url = %download_url, "B2 authorization successful");

        let bucket_id = self
            .get_bucket_id(&api_url, &auth_response.authorization_token, &auth_response.account_id, bucket_name)
            .await?;

        info!(bucket_name = bucket_name, bucket_id = %bucket_id, "B2 client ready");
        *self.auth_state.write().unwrap_or_else(PoisonError::into_inner) = Some(AuthState {
            auth_token: auth_response.authorization_token,
            api_url,
            download_url,
            bucket_id,
            bucket_name: bucket_name.to_string(),
        });
        Ok(())
    }

    /// Look up bucket ID from bucket name
    async fn get_bucket_id(
        &self,
        api_url: &str,
        auth_token: &str,
        account_id: &str,
        bucket_name: &str,
    ) -> Result<String, B2Error> {
        let url = format!("{}/b2api/v2/b2_list_buckets", api_url);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", auth_token)
            .json(&serde_json::json!({
                "accountId": account_id,
                "bucketName": bucket_name
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(B2Error::from_status(status, &body));
        }

        let list_response: ListBucketsResponse = response.json().await?;
        list_response
            .buckets
            .into_iter()
            .find(|b| b.bucket_name == bucket_name)
            .map(|b| b.bucket_id)
            .ok_or_else(|| B2Error::NotFound(format!("bucket '{}'", bucket_name)))
    }

    /// List every file version name under `prefix`, following pagination.
    ///
    /// No delimiter is sent, so the listing is recursive.
    pub async fn list_file_names(&self, prefix: Option<&str>) -> Result<Vec<FileInfo>, B2Error> {
        let state = self.state()?;
        let url = format!("{}/b2api/v2/b2_list_file_names", state.api_url);
        let mut all_files = Vec::new();
        let mut start_file_name: Option<String> = None;

        loop {
            let request = ListFileNamesRequest {
                bucket_id: state.bucket_id.clone(),
                prefix: prefix.map(String::from),
                max_file_count: LIST_PAGE_SIZE,
                start_file_name: start_file_name.clone(),
            };

            debug!(prefix = ?prefix, start = ?start_file_name, "Listing files from B2");

            let response = self
                .http_client
                .post(&url)
                .header("Authorization", &state.auth_token)
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(B2Error::from_status(status, &body));
            }

            let list_response: ListFilesResponse = response.json().await?;
            all_files.extend(list_response.files);

            match list_response.next_file_name {
                Some(next) => start_file_name = Some(next),
                None => break,
            }
        }

        debug!(count = all_files.len(), "Listed files from B2");
        Ok(all_files)
    }

    /// A URL that downloads exactly `file_name` for about `ttl`
    pub async fn download_url(&self, file_name: &str, ttl: Duration) -> Result<String, B2Error> {
        let state = self.state()?;
        let url = format!("{}/b2api/v2/b2_get_download_authorization", state.api_url);
        let request = DownloadAuthorizationRequest {
            bucket_id: state.bucket_id.clone(),
            file_name_prefix: file_name.to_string(),
            valid_duration_in_seconds: ttl
                .as_secs()
                .clamp(MIN_DOWNLOAD_AUTH_SECS, MAX_DOWNLOAD_AUTH_SECS),
        };

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &state.auth_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(B2Error::from_status(status, &body));
        }

        let authorization: DownloadAuthorization = response.json().await?;
        debug!(file = file_name, "Issued B2 download authorization");

        // Slashes stay literal so the path mirrors the bucket layout
        let encoded_name = urlencoding::encode(file_name).replace("%2F", "/");
        Ok(format!(
            "{}/file/{}/{}?Authorization={}",
            state.download_url,
            state.bucket_name,
            encoded_name,
            urlencoding::encode(&authorization.authorization_token)
        ))
    }
}
