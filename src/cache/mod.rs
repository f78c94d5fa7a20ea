//! Cached identity: items, the hash matcher, and their side files

pub mod hash_index;
pub mod item;
pub mod persist;
pub mod snapshot;
pub mod url_cache;

pub use hash_index::{FileHashRecord, HashIndex};
pub use item::{hex_digest_to_base64, CacheItem, Hashes};
pub use snapshot::InventorySnapshot;
pub use url_cache::UrlCache;
