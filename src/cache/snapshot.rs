//! Inventory snapshot
//!
//! Source name -> ordered item list, persisted next to the source contexts so
//! a restart can skip a full backend listing. Mapping tables are never part
//! of a snapshot.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::item::CacheItem;
use super::persist::{read_json, write_json};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventorySnapshot {
    pub sources: BTreeMap<String, Vec<CacheItem>>,
}

impl InventorySnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    pub fn insert(&mut self, source: impl Into<String>, items: Vec<CacheItem>) {
        self.sources.insert(source.into(), items);
    }

    pub fn get(&self, source: &str) -> Option<&Vec<CacheItem>> {
        self.sources.get(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Hashes;

    #[test]
    fn test_snapshot_file_shape() {
        let mut snapshot = InventorySnapshot::default();
        snapshot.insert(
            "drive",
            vec![CacheItem::new(
                "f1",
                Hashes::from([("sha1".to_string(), "AAA=".to_string())]),
                "/movies/a.mkv",
            )],
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["drive"][0]["itemId"], "f1");
        assert_eq!(json["drive"][0]["hashes"]["sha1"], "AAA=");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");

        let mut snapshot = InventorySnapshot::default();
        snapshot.insert("a", vec![CacheItem::new("1", Hashes::new(), "")]);
        snapshot.insert("b", Vec::new());
        snapshot.save(&path).unwrap();

        let loaded = InventorySnapshot::load(&path).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.get("a").map(Vec::len), Some(1));
        assert!(loaded.get("c").is_none());
    }
}
