//! Microsoft Graph drive item types

use serde::Deserialize;

use crate::cache::{hex_digest_to_base64, Hashes};

/// Response of the client-credentials token grant
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResource {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Digests OneDrive reports for a file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashesSet {
    #[serde(default)]
    pub quick_xor_hash: Option<String>,
    /// Hex
    #[serde(default)]
    pub sha1_hash: Option<String>,
    /// Hex
    #[serde(default)]
    pub sha256_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileFacet {
    #[serde(default)]
    pub hashes: Option<HashesSet>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFacet {
    #[serde(default)]
    pub child_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemReference {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file: Option<FileFacet>,
    #[serde(default)]
    pub folder: Option<FolderFacet>,
    #[serde(default)]
    pub parent_reference: Option<ItemReference>,
    #[serde(default, rename = "@microsoft.graph.downloadUrl")]
    pub download_url: Option<String>,
}

/// One page of a children listing
#[derive(Debug, Deserialize)]
pub struct ChildrenPage {
    #[serde(default)]
    pub value: Vec<DriveItem>,
    #[serde(default, rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    /// Path of the item inside the drive, e.g. `/drive/root:/movies/a.mkv`
    pub fn full_path(&self) -> String {
        match self.parent_reference.as_ref().and_then(|p| p.path.as_deref()) {
            Some(parent) => format!("{}/{}", parent.trim_end_matches('/'), self.name),
            None => self.name.clone(),
        }
    }

    /// Reported digests, normalized to base64
    pub fn hashes(&self) -> Hashes {
        let mut hashes = Hashes::new();
        let Some(set) = self.file.as_ref().and_then(|f| f.hashes.as_ref()) else {
            return hashes;
        };
        if let Some(qx) = set.quick_xor_hash.as_deref().filter(|h| !h.is_empty()) {
            hashes.insert("quickxorhash".to_string(), qx.to_string());
        }
        if let Some(sha1) = set.sha1_hash.as_deref().and_then(hex_digest_to_base64) {
            hashes.insert("sha1".to_string(), sha1);
        }
        if let Some(sha256) = set.sha256_hash.as_deref().and_then(hex_digest_to_base64) {
            hashes.insert("sha256".to_string(), sha256);
        }
        hashes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_file_item() {
        let json = r#"{
            "id": "01ABC",
            "name": "Alien.mkv",
            "size": 1234,
            "file": {"mimeType": "video/x-matroska", "hashes": {
                "quickXorHash": "dGVzdA==",
                "sha1Hash": "DA39A3EE5E6B4B0D3255BFEF95601890AFD80709"
            }},
            "parentReference": {"driveId": "d1", "path": "/drive/root:/movies"},
            "@microsoft.graph.downloadUrl": "https://dl.example/01ABC"
        }"#;
        let item: DriveItem = serde_json::from_str(json).unwrap();
        assert!(!item.is_folder());
        assert_eq!(item.full_path(), "/drive/root:/movies/Alien.mkv");
        assert_eq!(item.download_url.as_deref(), Some("https://dl.example/01ABC"));

        let hashes = item.hashes();
        assert_eq!(hashes.get("quickxorhash").map(String::as_str), Some("dGVzdA=="));
        assert_eq!(hashes.get("sha1").map(String::as_str), Some("2jmj7l5rSw0yVb/vlWAYkK/YBwk="));
        assert!(!hashes.contains_key("sha256"));
    }

    #[test]
    fn test_folder_has_no_hashes() {
        let json = r#"{"id": "F1", "name": "movies", "folder": {"childCount": 3}}"#;
        let item: DriveItem = serde_json::from_str(json).unwrap();
        assert!(item.is_folder());
        assert!(item.hashes().is_empty());
        assert_eq!(item.full_path(), "movies");
    }

    #[test]
    fn test_children_page_next_link() {
        let json = r#"{"value": [], "@odata.nextLink": "https://graph.example/next"}"#;
        let page: ChildrenPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_link.as_deref(), Some("https://graph.example/next"));
    }
}
