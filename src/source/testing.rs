//! Scriptable in-memory backend used by unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::context::{require, ContextStore, Credentials, SourceContext};
use super::errors::{Result, SourceError};
use super::registry::SourceRegistry;
use super::{Backend, BackendSource, RemoteFile, SourceDeps};
use crate::cache::{CacheItem, Hashes};

pub const FAKE_KIND: &str = "Fake";

/// Shared, inspectable state behind a [`FakeBackend`]
#[derive(Default)]
pub struct FakeState {
    pub files: Mutex<Vec<RemoteFile>>,
    pub auth_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub url_calls: AtomicUsize,
    /// Item ids URLs were requested for, in call order
    pub issued_for: Mutex<Vec<String>>,
    /// Errors for upcoming URL requests, front first
    pub url_failures: Mutex<VecDeque<SourceError>>,
    /// Errors for upcoming list requests, front first
    pub list_failures: Mutex<VecDeque<SourceError>>,
    pub auth_failure: Mutex<Option<SourceError>>,
    pub auth_delay: Mutex<Duration>,
}

impl FakeState {
    pub fn with_files(files: Vec<RemoteFile>) -> Arc<Self> {
        let state = Self::default();
        *state.files.lock().unwrap() = files;
        Arc::new(state)
    }

    pub fn fail_urls(&self, errors: impl IntoIterator<Item = SourceError>) {
        self.url_failures.lock().unwrap().extend(errors);
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn url_calls(&self) -> usize {
        self.url_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn issued_for(&self) -> Vec<String> {
        self.issued_for.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    pub state: Arc<FakeState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FakeCredentials {
    #[serde(default)]
    pub token: String,
}

impl Credentials for FakeCredentials {
    fn validate(&self) -> Result<()> {
        require("token", &self.token)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    const KIND: &'static str = FAKE_KIND;

    type Credentials = FakeCredentials;

    async fn authenticate(&self, _credentials: &FakeCredentials) -> Result<()> {
        self.state.auth_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.auth_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = self.state.auth_failure.lock().unwrap().clone();
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn list_all_files(&self) -> Result<Vec<RemoteFile>> {
        self.state.list_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.state.list_failures.lock().unwrap().pop_front();
        if let Some(e) = failure {
            return Err(e);
        }
        Ok(self.state.files.lock().unwrap().clone())
    }

    async fn issue_download_url(&self, item: &CacheItem, ttl: Duration) -> Result<String> {
        self.state.url_calls.fetch_add(1, Ordering::SeqCst);
        self.state.issued_for.lock().unwrap().push(item.item_id.clone());
        let failure = self.state.url_failures.lock().unwrap().pop_front();
        match failure {
            Some(e) => Err(e),
            None => Ok(format!(
                "https://fake.example/{}?ttl={}",
                item.item_id,
                ttl.as_secs()
            )),
        }
    }
}

pub fn hashes(pairs: &[(&str, &str)]) -> Hashes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn item(id: &str, algorithm: &str, digest: &str) -> CacheItem {
    CacheItem::new(id, hashes(&[(algorithm, digest)]), format!("/cloud/{}", id))
}

pub fn remote(id: &str, algorithm: &str, digest: &str) -> RemoteFile {
    RemoteFile::new(id, hashes(&[(algorithm, digest)]), format!("/cloud/{}", id))
}

pub fn deps() -> SourceDeps {
    SourceDeps {
        http: reqwest::Client::new(),
        contexts: Arc::new(ContextStore::in_memory(Vec::new())),
        url_ttl: Duration::from_secs(3600),
        url_cache_ttl: Duration::ZERO,
    }
}

pub fn fake_context(name: &str, items: &[CacheItem]) -> SourceContext {
    SourceContext::new(
        name,
        FAKE_KIND,
        json!({ "token": "secret", "cachedItems": items }),
    )
}

pub fn fake_source(state: &Arc<FakeState>, deps: &SourceDeps) -> BackendSource<FakeBackend> {
    BackendSource::new(
        "fake",
        FakeBackend {
            state: Arc::clone(state),
        },
        deps,
    )
}

/// A registry that builds every "Fake" source on top of `state`
pub fn fake_registry(state: &Arc<FakeState>, deps: SourceDeps) -> SourceRegistry {
    let mut registry = SourceRegistry::new(deps);
    let state = Arc::clone(state);
    registry.register_kind(FAKE_KIND, move |name, deps| {
        Arc::new(BackendSource::new(
            name,
            FakeBackend {
                state: Arc::clone(&state),
            },
            deps,
        ))
    });
    registry
}
