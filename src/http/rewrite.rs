//! Listing response inspection
//!
//! Media-server listing bodies are decoded, scanned for single-part media
//! and used to populate mappings. The document itself is never changed; the
//! bytes handed back are the decoded document re-encoded with the declared
//! `Content-Encoding`, or the untouched input whenever anything fails.

use std::io::{Read, Write};
use std::sync::Arc;

use axum::body::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::HashIndex;
use crate::source::SourceRegistry;

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("Malformed listing body: {0}")]
    ParseFailure(#[from] serde_json::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] std::io::Error),

    #[error("Unsupported content encoding: {0}")]
    UnsupportedEncoding(String),
}

/// Wire codec of a body, as detected while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Identity,
    Gzip,
    /// RFC 1950 framing, what `deflate` officially means
    Zlib,
    /// Bare RFC 1951 stream, sent by some servers as `deflate`
    RawDeflate,
}

/// Decode `data` according to a `Content-Encoding` header value
pub fn decode(content_encoding: Option<&str>, data: &[u8]) -> Result<(Codec, Vec<u8>), RewriteError> {
    let encoding = content_encoding.map(|e| e.trim().to_ascii_lowercase());
    match encoding.as_deref() {
        None | Some("") | Some("identity") => Ok((Codec::Identity, data.to_vec())),
        Some("gzip") | Some("x-gzip") => {
            let mut output = Vec::new();
            flate2::read::GzDecoder::new(data).read_to_end(&mut output)?;
            Ok((Codec::Gzip, output))
        }
        Some("deflate") => {
            let mut output = Vec::new();
            if flate2::read::ZlibDecoder::new(data).read_to_end(&mut output).is_ok() {
                return Ok((Codec::Zlib, output));
            }
            output.clear();
            flate2::read::DeflateDecoder::new(data).read_to_end(&mut output)?;
            Ok((Codec::RawDeflate, output))
        }
        Some(other) => Err(RewriteError::UnsupportedEncoding(other.to_string())),
    }
}

/// Encode `data` with the codec it was received in
pub fn encode(codec: Codec, data: &[u8]) -> Result<Vec<u8>, RewriteError> {
    let level = flate2::Compression::default();
    Ok(match codec {
        Codec::Identity => data.to_vec(),
        Codec::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()?
        }
        Codec::Zlib => {
            let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()?
        }
        Codec::RawDeflate => {
            let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()?
        }
    })
}

// Only the fields on the path container -> metadata -> media -> parts are
// read; everything else in the document is ignored. Entries of an
// unexpected shape are skipped one by one so a single odd entry does not
// hide the rest of the listing.

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(rename = "MediaContainer")]
    media_container: MediaContainer,
}

#[derive(Debug, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Metadata", default, deserialize_with = "lenient_vec")]
    metadata: Vec<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(rename = "Media", default, deserialize_with = "lenient_vec")]
    media: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    /// Kept raw so the part count includes entries that are not objects
    #[serde(rename = "Part", default, deserialize_with = "lenient_vec")]
    parts: Vec<Value>,
}

/// A missing, null or non-array field reads as empty; array elements that
/// do not deserialize as `T` are dropped
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(values)) => values
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// A single-part media entry of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRef {
    pub local_file: String,
    pub request_key: String,
}

/// Every `(file, key)` of media variants that have exactly one part
pub fn extract_parts(document: &[u8]) -> Result<Vec<PartRef>, RewriteError> {
    let listing: Listing = serde_json::from_slice(document)?;
    Ok(listing
        .media_container
        .metadata
        .iter()
        .flat_map(|metadata| metadata.media.iter())
        .filter_map(|media| match media.parts.as_slice() {
            [part] => Some(part),
            _ => None,
        })
        .filter_map(|part| {
            let local_file = part.get("file")?.as_str()?;
            let request_key = part.get("key")?.as_str()?;
            Some(PartRef {
                local_file: local_file.to_string(),
                request_key: request_key.to_string(),
            })
        })
        .collect())
}

pub struct ResponseRewriter {
    registry: Arc<SourceRegistry>,
    index: Arc<HashIndex>,
}

impl ResponseRewriter {
    pub fn new(registry: Arc<SourceRegistry>, index: Arc<HashIndex>) -> Self {
        Self { registry, index }
    }

    /// Inspect a listing body and return the bytes to send downstream.
    ///
    /// Never fails: on any decoding or parsing problem the input is returned
    /// unchanged.
    pub async fn rewrite(&self, content_encoding: Option<&str>, body: Bytes) -> Bytes {
        let (codec, document) = match decode(content_encoding, &body) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(error = %e, "Listing body not inspected");
                return body;
            }
        };

        let parts = match extract_parts(&document) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(error = %e, "Failed to parse listing body, passing through");
                return body;
            }
        };
        self.observe(&parts).await;

        match encode(codec, &document) {
            Ok(encoded) => Bytes::from(encoded),
            Err(e) => {
                warn!(error = %e, "Failed to re-encode listing body, passing through");
                body
            }
        }
    }

    /// Create mappings for parts the hash index knows and no source maps yet
    async fn observe(&self, parts: &[PartRef]) {
        if parts.is_empty() {
            return;
        }
        match self.index.reload_if_empty() {
            Some(Ok(count)) => debug!(entries = count, "Hash index loaded on demand"),
            Some(Err(e)) => debug!(error = %e, "Hash index still unavailable"),
            None => {}
        }

        for part in parts {
            let Some(hashes) = self.index.get(&part.local_file) else {
                continue;
            };
            if self.registry.has_mapping(&part.request_key).await {
                continue;
            }
            match self
                .registry
                .mapping_file(&part.request_key, &part.local_file, &hashes)
                .await
            {
                Ok(()) => info!(
                    request_key = %part.request_key,
                    local_file = %part.local_file,
                    "Mapped file from listing"
                ),
                Err(e) => warn!(
                    request_key = %part.request_key,
                    local_file = %part.local_file,
                    error = %e,
                    "Mapping from listing failed"
                ),
            }
        }
    }
}
