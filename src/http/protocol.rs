//! JSON bodies of the cache control endpoints

use serde::{Deserialize, Serialize};

use crate::cache::Hashes;
use crate::source::SourceStatus;

/// Body of `POST /cache/mapping`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingFileRequest {
    /// Request key as emitted by the media server
    pub req_url: String,
    pub local_name: String,
    #[serde(default)]
    pub hashes: Hashes,
}

/// Body of `GET /cache/status` and `POST /cache/refresh`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub sources: Vec<SourceStatus>,
    pub hash_index_entries: usize,
}

/// Body of `POST /cache/index/reload`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    pub entries: usize,
}

/// Error body of every failing control endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

/// Parse a mapping request from bytes
pub fn parse_mapping_request(data: &[u8]) -> Result<MappingFileRequest, serde_json::Error> {
    serde_json::from_slice(data)
}
