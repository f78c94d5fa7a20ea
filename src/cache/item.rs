//! Cached item model and the content-hash matcher
//!
//! A `CacheItem` is one object held by a cloud backend. Local media files are
//! joined to cached items by comparing named digests, never by path.

use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Named content digests: algorithm name -> digest
pub type Hashes = BTreeMap<String, String>;

/// One file held by a backend, as recorded by the last inventory refresh
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheItem {
    /// Backend-opaque object id
    pub item_id: String,
    /// Digests reported by the backend for this object
    #[serde(default)]
    pub hashes: Hashes,
    /// Location of the object inside the backend (informational)
    #[serde(default)]
    pub cached_path: String,
}

impl CacheItem {
    pub fn new(item_id: impl Into<String>, hashes: Hashes, cached_path: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            hashes,
            cached_path: cached_path.into(),
        }
    }

    /// Whether `candidate` describes the same content as this item.
    ///
    /// Every digest this item carries must be present in `candidate` with an
    /// equal value. Algorithms only the candidate knows about are ignored.
    /// An item without digests never matches.
    pub fn matches(&self, candidate: &Hashes) -> bool {
        !self.hashes.is_empty()
            && self
                .hashes
                .iter()
                .all(|(algorithm, digest)| candidate.get(algorithm) == Some(digest))
    }
}

/// Re-encode a hex digest as standard base64, the form the hash index uses.
///
/// Returns `None` for anything that is not valid hex.
pub fn hex_digest_to_base64(hex_digest: &str) -> Option<String> {
    let raw = hex::decode(hex_digest.trim()).ok()?;
    if raw.is_empty() {
        return None;
    }
    Some(base64::engine::general_purpose::STANDARD.encode(raw))
}
