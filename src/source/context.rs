//! Persisted source contexts
//!
//! On disk every source is `{name, type, context}`. The `type` tag picks the
//! backend; `context` stays untyped until that backend decodes it into its
//! own `TypedContext<Credentials>` shape.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context as _, Result as AnyResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::errors::{Result, SourceError};
use crate::cache::persist::{read_json, write_json};
use crate::cache::CacheItem;

/// Untyped per-source context as stored in the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceContext {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl SourceContext {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, context: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            context,
        }
    }

    /// Decode the payload into a backend's typed shape
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.context.clone())
            .map_err(|e| SourceError::InvalidCredentials(format!("{}: {}", self.name, e)))
    }
}

/// Long-lived credentials of one backend variant
pub trait Credentials: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Reject credentials with missing required fields
    fn validate(&self) -> Result<()>;
}

/// The typed payload every backend persists: its credentials plus state
/// shared by all variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedContext<C> {
    #[serde(flatten)]
    pub credentials: C,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cached_items: Vec<CacheItem>,
}

/// Reject an empty required credential field
pub fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SourceError::InvalidCredentials(format!("missing {}", field)));
    }
    Ok(())
}

/// On-disk shape of the context file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedContexts {
    #[serde(default)]
    pub sources: Vec<SourceContext>,
}

/// Owner of the context file.
///
/// Sources push their refreshed context here after reauthentication or an
/// inventory refresh. Writes are fire-and-forget: a failed write is logged
/// and the in-memory state stays authoritative.
pub struct ContextStore {
    path: Option<PathBuf>,
    contexts: Mutex<PersistedContexts>,
}

impl ContextStore {
    /// Open the context file at `path`.
    ///
    /// If it does not exist yet it is created from `seeds`; otherwise the
    /// file content supersedes the seeds.
    pub fn open(path: &Path, seeds: Vec<SourceContext>) -> AnyResult<Self> {
        let contexts = if path.exists() {
            let loaded: PersistedContexts = read_json(path)
                .with_context(|| format!("Failed to load context file {:?}", path))?;
            info!(path = %path.display(), sources = loaded.sources.len(), "Loaded source contexts");
            loaded
        } else {
            let seeded = PersistedContexts { sources: seeds };
            write_json(path, &seeded)
                .with_context(|| format!("Failed to create context file {:?}", path))?;
            info!(path = %path.display(), sources = seeded.sources.len(), "Created context file from configuration");
            seeded
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            contexts: Mutex::new(contexts),
        })
    }

    /// A store that never touches the disk
    pub fn in_memory(sources: Vec<SourceContext>) -> Self {
        Self {
            path: None,
            contexts: Mutex::new(PersistedContexts { sources }),
        }
    }

    pub fn sources(&self) -> Vec<SourceContext> {
        self.lock().sources.clone()
    }

    pub fn get(&self, name: &str) -> Option<SourceContext> {
        self.lock().sources.iter().find(|s| s.name == name).cloned()
    }

    /// Replace (or add) the context of one source and rewrite the file
    pub fn update(&self, context: SourceContext) {
        let mut contexts = self.lock();
        match contexts.sources.iter_mut().find(|s| s.name == context.name) {
            Some(existing) => *existing = context,
            None => contexts.sources.push(context),
        }

        let Some(path) = &self.path else {
            return;
        };
        match write_json(path, &*contexts) {
            Ok(()) => debug!(path = %path.display(), "Persisted source contexts"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to persist source contexts"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PersistedContexts> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
