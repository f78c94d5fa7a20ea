//! Source registry
//!
//! Owns every named source for the lifetime of the process. Backends are
//! built through factories registered by type tag, so adding a provider is a
//! `register_kind` call rather than a new match arm.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::errors::{Result, SourceError};
use super::{Backend, BackendSource, CacheSource, SourceContext, SourceDeps, SourceStatus};
use crate::b2::{B2Backend, B2Client};
use crate::cache::{Hashes, InventorySnapshot};
use crate::onedrive::{OneDriveBackend, OneDriveClient};

/// Builds a source named `name` for one type tag
pub type SourceFactory = Arc<dyn Fn(&str, &SourceDeps) -> Arc<dyn CacheSource> + Send + Sync>;

pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
    /// Ordered by name so broadcasts and snapshots are deterministic
    sources: RwLock<BTreeMap<String, Arc<dyn CacheSource>>>,
    deps: SourceDeps,
}

impl SourceRegistry {
    /// An empty registry with no known backend kinds
    pub fn new(deps: SourceDeps) -> Self {
        Self {
            factories: HashMap::new(),
            sources: RwLock::new(BTreeMap::new()),
            deps,
        }
    }

    /// A registry that knows the built-in backends
    pub fn with_default_kinds(deps: SourceDeps) -> Self {
        let mut registry = Self::new(deps);
        registry.register_kind(B2Backend::KIND, |name, deps| {
            Arc::new(BackendSource::new(
                name,
                B2Backend::new(B2Client::new(deps.http.clone())),
                deps,
            ))
        });
        registry.register_kind(OneDriveBackend::KIND, |name, deps| {
            Arc::new(BackendSource::new(
                name,
                OneDriveBackend::new(OneDriveClient::new(deps.http.clone())),
                deps,
            ))
        });
        registry
    }

    /// Register (or replace) the factory for a type tag
    pub fn register_kind<F>(&mut self, tag: &str, factory: F)
    where
        F: Fn(&str, &SourceDeps) -> Arc<dyn CacheSource> + Send + Sync + 'static,
    {
        self.factories.insert(tag.to_string(), Arc::new(factory));
    }

    /// Build, restore and register one source.
    ///
    /// A source restored with an empty inventory is refreshed immediately.
    /// Returns whether that refresh happened.
    pub async fn restore(&self, context: &SourceContext) -> Result<bool> {
        let source = self.register(context).await?;
        self.refresh_if_empty(source.as_ref()).await
    }

    /// Restore every configured source; the first failure aborts.
    ///
    /// Inventories carried by the contexts are kept as they are. Sources
    /// restored empty are hydrated from the snapshot, and only those the
    /// snapshot does not cover are refreshed from their backend. If any
    /// source had to be refreshed the snapshot is rewritten.
    pub async fn restore_all(&self, contexts: &[SourceContext], snapshot_path: &Path) -> Result<()> {
        let mut registered = Vec::with_capacity(contexts.len());
        for context in contexts {
            registered.push(self.register(context).await?);
        }
        self.restore_snapshot(snapshot_path).await;

        let mut refreshed = false;
        for source in &registered {
            refreshed |= self.refresh_if_empty(source.as_ref()).await?;
        }
        if refreshed {
            self.write_snapshot(snapshot_path).await?;
        }
        info!(count = contexts.len(), "All sources restored");
        Ok(())
    }

    async fn register(&self, context: &SourceContext) -> Result<Arc<dyn CacheSource>> {
        if self.has_source(&context.name).await {
            return Err(SourceError::SourceAlreadyRegistered(context.name.clone()));
        }
        let factory = self
            .factories
            .get(&context.kind)
            .ok_or_else(|| SourceError::UnsupportedSourceType(context.kind.clone()))?;

        let source = factory(&context.name, &self.deps);
        source.restore(context).await?;

        {
            let mut sources = self.sources.write().await;
            if sources.contains_key(&context.name) {
                return Err(SourceError::SourceAlreadyRegistered(context.name.clone()));
            }
            sources.insert(context.name.clone(), Arc::clone(&source));
        }
        info!(source = %context.name, kind = %context.kind, "Source registered");
        Ok(source)
    }

    async fn refresh_if_empty(&self, source: &dyn CacheSource) -> Result<bool> {
        if source.cached_file_size() > 0 {
            return Ok(false);
        }
        info!(source = %source.name(), "Empty inventory, refreshing from backend");
        source.refresh_source().await?;
        Ok(true)
    }

    /// Offer a mapping to every source, in name order.
    ///
    /// Stops at the first source that fails and returns its error.
    pub async fn mapping_file(&self, request_key: &str, local_name: &str, hashes: &Hashes) -> Result<()> {
        for source in self.snapshot_sources().await {
            if let Err(e) = source.mapping_file(request_key, local_name, hashes) {
                warn!(
                    source = %source.name(),
                    request_key = request_key,
                    local_name = local_name,
                    error = %e,
                    "Mapping attempt failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Whether any source maps `request_key`
    pub async fn has_mapping(&self, request_key: &str) -> bool {
        self.sources
            .read()
            .await
            .values()
            .any(|source| source.has_mapping(request_key))
    }

    pub async fn get_source(&self, name: &str) -> Option<Arc<dyn CacheSource>> {
        self.sources.read().await.get(name).cloned()
    }

    pub async fn has_source(&self, name: &str) -> bool {
        self.sources.read().await.contains_key(name)
    }

    /// Refresh every source and rewrite the snapshot.
    ///
    /// A source that fails to refresh keeps its previous inventory.
    pub async fn refresh_all(&self, snapshot_path: &Path) -> Result<()> {
        for source in self.snapshot_sources().await {
            match source.refresh_source().await {
                Ok(items) => debug!(source = %source.name(), count = items.len(), "Refreshed"),
                Err(e) => error!(source = %source.name(), error = %e, "Failed to refresh source, skipping"),
            }
        }
        self.write_snapshot(snapshot_path).await
    }

    /// Hydrate registered sources whose inventory is still empty from the
    /// snapshot file.
    ///
    /// An inventory restored from a source's own context is newer than or as
    /// new as the snapshot and is left alone. A missing or unreadable
    /// snapshot only logs.
    pub async fn restore_snapshot(&self, snapshot_path: &Path) {
        if !snapshot_path.exists() {
            debug!(path = %snapshot_path.display(), "No inventory snapshot");
            return;
        }
        let snapshot = match InventorySnapshot::load(snapshot_path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %snapshot_path.display(), error = %e, "Failed to load inventory snapshot");
                return;
            }
        };

        for source in self.snapshot_sources().await {
            if source.cached_file_size() > 0 {
                continue;
            }
            if let Some(items) = snapshot.get(source.name()) {
                source.restore_source(items.clone());
            }
        }
        info!(path = %snapshot_path.display(), "Inventory snapshot restored");
    }

    /// Write every source's current inventory to the snapshot file
    pub async fn write_snapshot(&self, snapshot_path: &Path) -> Result<()> {
        let mut snapshot = InventorySnapshot::default();
        for source in self.snapshot_sources().await {
            snapshot.insert(source.name(), source.inventory());
        }
        snapshot
            .save(snapshot_path)
            .map_err(|e| SourceError::Persistence(format!("{:#}", e)))?;
        debug!(path = %snapshot_path.display(), "Inventory snapshot written");
        Ok(())
    }

    pub async fn statuses(&self) -> Vec<SourceStatus> {
        self.sources
            .read()
            .await
            .values()
            .map(|source| source.status())
            .collect()
    }

    /// Clone the source handles so no registry lock is held across awaits
    async fn snapshot_sources(&self) -> Vec<Arc<dyn CacheSource>> {
        self.sources.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::{deps, fake_registry, hashes, item, remote, FakeState, FAKE_KIND};
    use serde_json::json;

    fn ctx(name: &str, items: &[crate::cache::CacheItem]) -> SourceContext {
        crate::source::testing::fake_context(name, items)
    }

    #[tokio::test]
    async fn test_restore_registers_source() {
        let state = Arc::new(FakeState::default());
        let registry = fake_registry(&state, deps());

        let refreshed = registry.restore(&ctx("a", &[item("f1", "sha1", "A=")])).await.unwrap();
        assert!(!refreshed);
        assert!(registry.has_source("a").await);
        assert!(registry.get_source("a").await.is_some());
        assert!(!registry.has_source("b").await);
        assert_eq!(state.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_restore_with_empty_inventory_refreshes() {
        let state = FakeState::with_files(vec![remote("f1", "sha1", "A=")]);
        let registry = fake_registry(&state, deps());

        let refreshed = registry.restore(&ctx("a", &[])).await.unwrap();
        assert!(refreshed);
        assert_eq!(state.list_calls(), 1);
        assert_eq!(registry.get_source("a").await.unwrap().cached_file_size(), 1);
    }

    #[tokio::test]
    async fn test_restore_rejects_duplicate_name() {
        let state = Arc::new(FakeState::default());
        let registry = fake_registry(&state, deps());
        let context = ctx("a", &[item("f1", "sha1", "A=")]);

        registry.restore(&context).await.unwrap();
        let err = registry.restore(&context).await.unwrap_err();
        assert_eq!(err, SourceError::SourceAlreadyRegistered("a".into()));
    }

    #[tokio::test]
    async fn test_restore_rejects_unknown_kind() {
        let state = Arc::new(FakeState::default());
        let registry = fake_registry(&state, deps());
        let context = SourceContext::new("x", "Dropbox", json!({}));

        let err = registry.restore(&context).await.unwrap_err();
        assert_eq!(err, SourceError::UnsupportedSourceType("Dropbox".into()));
        assert!(!registry.has_source("x").await);
    }

    #[tokio::test]
    async fn test_failed_restore_does_not_register() {
        let state = Arc::new(FakeState::default());
        let registry = fake_registry(&state, deps());
        let context = SourceContext::new("a", FAKE_KIND, json!({ "token": "" }));

        assert!(matches!(
            registry.restore(&context).await,
            Err(SourceError::InvalidCredentials(_))
        ));
        assert!(!registry.has_source("a").await);
    }

    #[tokio::test]
    async fn test_restore_all_writes_snapshot_after_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("sources.json");
        let state = FakeState::with_files(vec![remote("f1", "sha1", "A=")]);
        let registry = fake_registry(&state, deps());

        registry
            .restore_all(&[ctx("a", &[]), ctx("b", &[item("f9", "sha1", "Z=")])], &snapshot)
            .await
            .unwrap();

        let written = InventorySnapshot::load(&snapshot).unwrap();
        assert_eq!(written.get("a").unwrap()[0].item_id, "f1");
        assert_eq!(written.get("b").unwrap()[0].item_id, "f9");
    }

    #[tokio::test]
    async fn test_restore_all_stops_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(FakeState::default());
        let registry = fake_registry(&state, deps());
        let contexts = [
            SourceContext::new("bad", "Nope", json!({})),
            ctx("good", &[item("f1", "sha1", "A=")]),
        ];

        assert!(registry
            .restore_all(&contexts, &dir.path().join("sources.json"))
            .await
            .is_err());
        assert!(!registry.has_source("good").await);
    }

    #[tokio::test]
    async fn test_mapping_broadcast_maps_every_matching_source() {
        let state = Arc::new(FakeState::default());
        let registry = fake_registry(&state, deps());
        registry.restore(&ctx("a", &[item("f1", "sha1", "A=")])).await.unwrap();
        registry.restore(&ctx("b", &[item("g1", "sha1", "A=")])).await.unwrap();

        registry
            .mapping_file("/library/parts/1", "movie.mkv", &hashes(&[("sha1", "A=")]))
            .await
            .unwrap();
        assert!(registry.get_source("a").await.unwrap().has_mapping("/library/parts/1"));
        assert!(registry.get_source("b").await.unwrap().has_mapping("/library/parts/1"));
        assert!(registry.has_mapping("/library/parts/1").await);
    }

    #[tokio::test]
    async fn test_mapping_broadcast_stops_at_first_failure() {
        let state = Arc::new(FakeState::default());
        let registry = fake_registry(&state, deps());
        // "a" sorts first and has no match, so "b" is never tried
        registry.restore(&ctx("a", &[item("f1", "sha1", "X=")])).await.unwrap();
        registry.restore(&ctx("b", &[item("g1", "sha1", "A=")])).await.unwrap();

        let err = registry
            .mapping_file("/k", "movie.mkv", &hashes(&[("sha1", "A=")]))
            .await
            .unwrap_err();
        assert_eq!(err, SourceError::CachedFileNotFound("movie.mkv".into()));
        assert!(!registry.get_source("b").await.unwrap().has_mapping("/k"));
        assert!(!registry.has_mapping("/k").await);
    }

    #[tokio::test]
    async fn test_refresh_all_then_restore_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("sources.json");
        let state = FakeState::with_files(vec![remote("f1", "sha1", "A="), remote("f2", "sha1", "B=")]);

        let registry = fake_registry(&state, deps());
        registry.restore(&ctx("a", &[item("old", "sha1", "O=")])).await.unwrap();
        registry.refresh_all(&snapshot).await.unwrap();

        // Cold start: inventory comes from the snapshot, not the backend
        let cold = fake_registry(&state, deps());
        let lists_before = state.list_calls();
        cold.restore_all(&[ctx("a", &[])], &snapshot).await.unwrap();

        let source = cold.get_source("a").await.unwrap();
        assert_eq!(source.cached_file_size(), 2);
        assert_eq!(state.list_calls(), lists_before);
    }

    #[tokio::test]
    async fn test_context_inventory_wins_over_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("sources.json");
        let mut stale = InventorySnapshot::default();
        stale.insert("a", vec![item("stale", "sha1", "S=")]);
        stale.insert("b", vec![item("b1", "sha1", "B="), item("b2", "sha1", "C=")]);
        stale.save(&snapshot).unwrap();

        let state = Arc::new(FakeState::default());
        let registry = fake_registry(&state, deps());
        registry
            .restore_all(&[ctx("a", &[item("fresh", "sha1", "F=")]), ctx("b", &[])], &snapshot)
            .await
            .unwrap();

        let a = registry.get_source("a").await.unwrap();
        assert_eq!(a.inventory()[0].item_id, "fresh");
        assert_eq!(a.cached_file_size(), 1);
        assert_eq!(registry.get_source("b").await.unwrap().cached_file_size(), 2);
        assert_eq!(state.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_all_skips_failing_source() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("sources.json");
        let state = FakeState::with_files(vec![remote("f1", "sha1", "A=")]);
        let registry = fake_registry(&state, deps());
        registry.restore(&ctx("a", &[item("old", "sha1", "O=")])).await.unwrap();
        state
            .list_failures
            .lock()
            .unwrap()
            .push_back(SourceError::BackendUnavailable("down".into()));

        registry.refresh_all(&snapshot).await.unwrap();
        let written = InventorySnapshot::load(&snapshot).unwrap();
        assert_eq!(written.get("a").unwrap()[0].item_id, "old");
    }

    #[tokio::test]
    async fn test_restore_snapshot_tolerates_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("sources.json");
        std::fs::write(&snapshot, "not json").unwrap();
        let state = Arc::new(FakeState::default());
        let registry = fake_registry(&state, deps());
        registry.restore(&ctx("a", &[item("f1", "sha1", "A=")])).await.unwrap();

        registry.restore_snapshot(&snapshot).await;
        registry.restore_snapshot(&dir.path().join("missing.json")).await;
        assert_eq!(registry.get_source("a").await.unwrap().cached_file_size(), 1);
    }

    #[tokio::test]
    async fn test_statuses_in_name_order() {
        let state = Arc::new(FakeState::default());
        let registry = fake_registry(&state, deps());
        registry.restore(&ctx("zeta", &[item("f1", "sha1", "A=")])).await.unwrap();
        registry.restore(&ctx("alpha", &[item("f2", "sha1", "B=")])).await.unwrap();

        let names: Vec<String> = registry.statuses().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_default_kinds_are_registered() {
        let registry = SourceRegistry::with_default_kinds(deps());
        assert!(registry.factories.contains_key("B2"));
        assert!(registry.factories.contains_key("OneDriveForBusiness"));
    }
}
