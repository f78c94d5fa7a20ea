//! Local file hash index
//!
//! Read-only view of the side file produced by the hash indexer: an ordered
//! list of `{filename, hashes}` records. Filenames are the paths the media
//! server reports for its parts.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::item::Hashes;
use super::persist::read_json;

/// One record of the hash index file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHashRecord {
    pub filename: String,
    #[serde(default)]
    pub hashes: Hashes,
}

/// Minimum spacing between on-demand loads of a missing index
const LAZY_RELOAD_INTERVAL: Duration = Duration::from_secs(30);

/// filename -> hashes lookup, reloadable from disk
pub struct HashIndex {
    path: PathBuf,
    records: RwLock<HashMap<String, Hashes>>,
    last_lazy_reload: Mutex<Option<Instant>>,
}

impl HashIndex {
    /// Open the index at `path`.
    ///
    /// A missing or unreadable file leaves the index empty; it can be loaded
    /// later with [`HashIndex::reload`].
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let index = Self {
            path: path.into(),
            records: RwLock::new(HashMap::new()),
            last_lazy_reload: Mutex::new(None),
        };
        if let Err(e) = index.reload() {
            warn!(path = %index.path.display(), error = %e, "Hash index not loaded");
        }
        index
    }

    /// Build an in-memory index that is not backed by a file
    pub fn from_records(records: impl IntoIterator<Item = FileHashRecord>) -> Self {
        Self {
            path: PathBuf::new(),
            records: RwLock::new(index_records(records)),
            last_lazy_reload: Mutex::new(None),
        }
    }

    /// Re-read the index file, replacing the current records.
    ///
    /// Returns the number of distinct filenames loaded.
    pub fn reload(&self) -> Result<usize> {
        let records: Vec<FileHashRecord> = read_json(&self.path)?;
        let loaded = index_records(records);
        let count = loaded.len();

        *self.records.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        info!(path = %self.path.display(), count = count, "Hash index loaded");
        Ok(count)
    }

    /// Reload an empty index, at most once per [`LAZY_RELOAD_INTERVAL`].
    ///
    /// Returns `None` when the index is populated or the last attempt was too
    /// recent.
    pub fn reload_if_empty(&self) -> Option<Result<usize>> {
        if !self.is_empty() {
            return None;
        }
        {
            let mut last = self.last_lazy_reload.lock().unwrap_or_else(PoisonError::into_inner);
            if last.is_some_and(|at| at.elapsed() < LAZY_RELOAD_INTERVAL) {
                return None;
            }
            *last = Some(Instant::now());
        }
        Some(self.reload())
    }

    /// Hashes recorded for `filename`
    pub fn get(&self, filename: &str) -> Option<Hashes> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(filename)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Later records for the same filename replace earlier ones
fn index_records(records: impl IntoIterator<Item = FileHashRecord>) -> HashMap<String, Hashes> {
    records
        .into_iter()
        .map(|record| (record.filename, record.hashes))
        .collect()
}
