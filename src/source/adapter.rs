//! Generic source adapter
//!
//! `BackendSource` owns everything a source keeps regardless of provider:
//! credentials and session generation, the inventory, the mapping table, the
//! issued-URL cache and context persistence.
//!
//! Locking:
//! - inventory and mapping table each sit behind their own `RwLock`; no lock
//!   is held across an await
//! - session renewal is serialized by `init_lock`; a caller that saw an
//!   expired session only renews it if nobody renewed it in the meantime

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::backend::Backend;
use super::context::{ContextStore, Credentials, SourceContext, TypedContext};
use super::errors::{Result, SourceError};
use super::retry::ReauthPolicy;
use super::{CacheSource, SourceDeps, SourceStatus};
use crate::cache::{CacheItem, Hashes, UrlCache};

type Inventory = Arc<Vec<Arc<CacheItem>>>;

/// Credentials and bookkeeping of the current session
struct SessionState<C> {
    credentials: Option<C>,
    last_refresh_time: Option<DateTime<Utc>>,
}

/// A [`CacheSource`] backed by any [`Backend`]
pub struct BackendSource<B: Backend> {
    name: String,
    backend: B,
    session: RwLock<SessionState<B::Credentials>>,
    inventory: RwLock<Inventory>,
    /// request key -> item; entries share the inventory's items
    mapping: RwLock<HashMap<String, Arc<CacheItem>>>,
    /// Serializes `init`
    init_lock: tokio::sync::Mutex<()>,
    /// Bumped on every successful `init`
    generation: AtomicU64,
    policy: ReauthPolicy,
    url_ttl: Duration,
    urls: UrlCache,
    contexts: Arc<ContextStore>,
}

impl<B: Backend> BackendSource<B> {
    pub fn new(name: impl Into<String>, backend: B, deps: &SourceDeps) -> Self {
        Self {
            name: name.into(),
            backend,
            session: RwLock::new(SessionState {
                credentials: None,
                last_refresh_time: None,
            }),
            inventory: RwLock::new(Arc::new(Vec::new())),
            mapping: RwLock::new(HashMap::new()),
            init_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            policy: ReauthPolicy::default(),
            url_ttl: deps.url_ttl,
            // An issued URL must never outlive what the backend granted
            urls: UrlCache::with_ttl(deps.url_cache_ttl.min(deps.url_ttl)),
            contexts: Arc::clone(&deps.contexts),
        }
    }

    /// Exchange `credentials` for a new backend session.
    ///
    /// Safe to call repeatedly; each call replaces the session.
    pub async fn init(&self, credentials: &B::Credentials) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        self.init_locked(credentials).await
    }

    async fn init_locked(&self, credentials: &B::Credentials) -> Result<()> {
        self.backend.authenticate(credentials).await?;

        {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            session.credentials = Some(credentials.clone());
            session.last_refresh_time = Some(Utc::now());
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.urls.clear();

        info!(source = %self.name, kind = B::KIND, "Source session initialized");
        Ok(())
    }

    /// Renew the session unless it changed since `seen_generation`, then
    /// persist the refreshed context
    async fn reauthenticate(&self, seen_generation: u64) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.generation.load(Ordering::Acquire) != seen_generation {
            debug!(source = %self.name, "Session already renewed by a concurrent request");
            return Ok(());
        }

        let credentials = self.credentials()?;
        self.init_locked(&credentials).await?;
        self.persist();
        Ok(())
    }

    /// Run a backend call under the reauthentication policy
    async fn with_reauth<T, Call, Fut>(&self, operation: &str, call: Call) -> Result<T>
    where
        Call: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let seen = self.generation.load(Ordering::Acquire);
        self.policy
            .run(operation, call, move || self.reauthenticate(seen))
            .await
    }

    fn credentials(&self) -> Result<B::Credentials> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .credentials
            .clone()
            .ok_or_else(|| SourceError::AuthError(format!("source {} was never restored", self.name)))
    }

    fn current_inventory(&self) -> Inventory {
        Arc::clone(&self.inventory.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace_inventory(&self, items: Vec<CacheItem>) {
        let items: Vec<Arc<CacheItem>> = items.into_iter().map(Arc::new).collect();
        *self.inventory.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(items);
    }

    fn persist(&self) {
        match self.context() {
            Ok(context) => self.contexts.update(context),
            Err(e) => warn!(source = %self.name, error = %e, "Source context not persisted"),
        }
    }
}

#[async_trait]
impl<B: Backend> CacheSource for BackendSource<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        B::KIND
    }

    async fn restore(&self, context: &SourceContext) -> Result<()> {
        let typed: TypedContext<B::Credentials> = context.decode()?;
        typed.credentials.validate()?;

        {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            session.credentials = Some(typed.credentials.clone());
            session.last_refresh_time = typed.last_refresh_time;
        }
        let cached = typed.cached_items.len();
        self.replace_inventory(typed.cached_items);
        info!(source = %self.name, kind = B::KIND, cached = cached, "Source context restored");

        self.init(&typed.credentials).await
    }

    async fn refresh_source(&self) -> Result<Vec<CacheItem>> {
        let backend = &self.backend;
        let files = self
            .with_reauth("refresh_source", move || backend.list_all_files())
            .await?;

        let items: Vec<CacheItem> = files.into_iter().map(CacheItem::from).collect();
        self.replace_inventory(items.clone());
        info!(source = %self.name, count = items.len(), "Source inventory refreshed");

        self.persist();
        Ok(items)
    }

    fn restore_source(&self, items: Vec<CacheItem>) {
        let count = items.len();
        self.replace_inventory(items);
        debug!(source = %self.name, count = count, "Source inventory restored from snapshot");
    }

    fn mapping_file(&self, request_key: &str, local_name: &str, hashes: &Hashes) -> Result<()> {
        let inventory = self.current_inventory();
        let item = inventory
            .iter()
            .find(|item| item.matches(hashes))
            .cloned()
            .ok_or_else(|| SourceError::CachedFileNotFound(local_name.to_string()))?;

        info!(
            source = %self.name,
            request_key = request_key,
            local_name = local_name,
            item_id = %item.item_id,
            "Mapped request key to cached file"
        );
        self.mapping
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_key.to_string(), item);
        Ok(())
    }

    async fn get_url(&self, request_key: &str) -> Result<String> {
        let item = self
            .mapping
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request_key)
            .cloned()
            .ok_or_else(|| SourceError::MappingNotFound(request_key.to_string()))?;

        if let Some(url) = self.urls.get(&item.item_id) {
            return Ok(url);
        }

        let backend = &self.backend;
        let target: &CacheItem = &item;
        let ttl = self.url_ttl;
        let url = self
            .with_reauth("get_url", move || backend.issue_download_url(target, ttl))
            .await
            .inspect_err(|e| {
                warn!(
                    source = %self.name,
                    request_key = request_key,
                    item_id = %item.item_id,
                    error = %e,
                    "Failed to issue download URL"
                )
            })?;

        self.urls.insert(&item.item_id, &url);
        debug!(source = %self.name, request_key = request_key, item_id = %item.item_id, "Issued download URL");
        Ok(url)
    }

    fn has_mapping(&self, request_key: &str) -> bool {
        self.mapping
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(request_key)
    }

    fn cached_file_size(&self) -> usize {
        self.current_inventory().len()
    }

    fn mapped_file_size(&self) -> usize {
        self.mapping.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn inventory(&self) -> Vec<CacheItem> {
        self.current_inventory()
            .iter()
            .map(|item| CacheItem::clone(item))
            .collect()
    }

    fn context(&self) -> Result<SourceContext> {
        let (credentials, last_refresh_time) = {
            let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
            (session.credentials.clone(), session.last_refresh_time)
        };
        let credentials = credentials.ok_or_else(|| {
            SourceError::Persistence(format!("source {} has no context yet", self.name))
        })?;

        let typed = TypedContext {
            credentials,
            last_refresh_time,
            cached_items: self.inventory(),
        };
        let payload = serde_json::to_value(&typed)
            .map_err(|e| SourceError::Persistence(e.to_string()))?;
        Ok(SourceContext::new(self.name.clone(), B::KIND, payload))
    }

    fn status(&self) -> SourceStatus {
        let last_refresh_time = self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_refresh_time;
        let (url_cache_hits, url_cache_misses) = self.urls.stats();
        SourceStatus {
            name: self.name.clone(),
            kind: B::KIND.to_string(),
            cached_files: self.cached_file_size(),
            mapped_files: self.mapped_file_size(),
            last_refresh_time,
            url_cache_hits,
            url_cache_misses,
        }
    }
}
