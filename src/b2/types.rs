//! B2 API types
//!
//! Response shapes of the B2 native API and their conversion into hash sets.

use serde::{Deserialize, Serialize};

use crate::cache::{hex_digest_to_base64, Hashes};

/// Response from b2_authorize_account (v3 nests the storage API info)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeAccountResponse {
    pub account_id: String,
    pub authorization_token: String,
    pub api_info: ApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInfo {
    pub storage_api: StorageApiInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageApiInfo {
    pub api_url: String,
    pub download_url: String,
}

/// Response from b2_list_buckets
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBucketsResponse {
    pub buckets: Vec<BucketInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub bucket_id: String,
    pub bucket_name: String,
}

/// Request body for b2_list_file_names
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFileNamesRequest {
    pub bucket_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub max_file_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_name: Option<String>,
}

/// B2 file/folder information from API responses
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Full file path within the bucket
    pub file_name: String,
    /// Action type: "upload", "folder", "hide", "start"
    pub action: String,
    /// Optional file ID (null for folder entries)
    #[serde(default)]
    pub file_id: Option<String>,
    /// Hex SHA-1, "none", or "unverified:<hex>" for large files
    #[serde(default)]
    pub content_sha1: Option<String>,
}

/// Response from b2_list_file_names
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesResponse {
    pub files: Vec<FileInfo>,
    /// Next file name for pagination (None if no more files)
    pub next_file_name: Option<String>,
}

/// Request body for b2_get_download_authorization
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAuthorizationRequest {
    pub bucket_id: String,
    pub file_name_prefix: String,
    pub valid_duration_in_seconds: u64,
}

/// Response from b2_get_download_authorization
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAuthorization {
    pub authorization_token: String,
}

impl FileInfo {
    /// Check if this entry represents a directory
    pub fn is_directory(&self) -> bool {
        self.action == "folder" || self.file_name.ends_with('/')
    }

    /// A stored file version (not a folder, hide marker or unfinished upload)
    pub fn is_leaf(&self) -> bool {
        self.action == "upload" && !self.is_directory() && self.file_id.is_some()
    }

    /// Digests B2 vouches for, normalized to base64
    pub fn hashes(&self) -> Hashes {
        let mut hashes = Hashes::new();
        let Some(sha1) = self.content_sha1.as_deref() else {
            return hashes;
        };
        if sha1 == "none" || sha1.starts_with("unverified:") {
            return hashes;
        }
        if let Some(digest) = hex_digest_to_base64(sha1) {
            hashes.insert("sha1".to_string(), digest);
        }
        hashes
    }
}
