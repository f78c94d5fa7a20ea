//! Atomic JSON persistence for side files
//!
//! Snapshots and source contexts are rewritten wholesale. Writes go to a temp
//! file in the destination directory and are renamed into place, so a crash
//! leaves either the old or the new file on disk.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Serialize `value` as indented JSON and atomically replace `path`
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value).context("Failed to encode JSON")?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {:?}", parent))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .context("Failed to create temp file")?;
    tmp.write_all(&data).context("Failed to write temp file")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to persist file: {:?}", path))?;

    debug!(path = %path.display(), size = data.len(), "Wrote JSON file");
    Ok(())
}

/// Read and decode a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_slice(&data).with_context(|| format!("Failed to parse {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut value = BTreeMap::new();
        value.insert("a".to_string(), vec![1, 2, 3]);
        write_json(&path, &value).unwrap();

        let back: BTreeMap<String, Vec<u32>> = read_json(&path).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json(&path, &vec!["old"]).unwrap();
        write_json(&path, &vec!["new"]).unwrap();

        let back: Vec<String> = read_json(&path).unwrap();
        assert_eq!(back, vec!["new".to_string()]);
        // No temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(read_json::<Vec<String>>(&missing).is_err());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, b"{not json").unwrap();
        assert!(read_json::<Vec<String>>(&corrupt).is_err());
    }
}
