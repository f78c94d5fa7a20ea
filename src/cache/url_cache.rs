//! Issued download URL cache
//!
//! Players open a part with a burst of range requests. Each one resolves to
//! the same backend object, so a freshly issued URL is reused for a short
//! while instead of asking the backend again. Uses a synchronous Moka cache
//! keyed by backend item id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, trace};

/// TTL-bounded cache of item id -> download URL
pub struct UrlCache {
    /// `None` when reuse is disabled
    urls: Option<Cache<String, String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl UrlCache {
    /// Create a cache keeping URLs for `ttl`; a zero TTL disables caching
    pub fn with_ttl(ttl: Duration) -> Self {
        let urls = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .time_to_live(ttl)
                .name("download_url_cache")
                .build()
        });

        Self {
            urls,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, item_id: &str) -> Option<String> {
        let urls = self.urls.as_ref()?;
        match urls.get(item_id) {
            Some(url) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(item_id = item_id, "URL cache HIT");
                Some(url)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(item_id = item_id, "URL cache MISS");
                None
            }
        }
    }

    pub fn insert(&self, item_id: &str, url: &str) {
        if let Some(urls) = &self.urls {
            urls.insert(item_id.to_string(), url.to_string());
        }
    }

    /// Drop every cached URL, e.g. after the session was renewed
    pub fn clear(&self) {
        if let Some(urls) = &self.urls {
            urls.invalidate_all();
            debug!("Cleared download URL cache");
        }
    }

    /// Returns (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
