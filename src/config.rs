//! Service configuration
//!
//! Loaded once at startup from a JSON file. Everything but `contextFile` has
//! a default.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::source::SourceContext;

pub const CONFIG_ENV: &str = "FILESRV_CONFIG";
pub const PORT_ENV: &str = "FILESRV_PORT";
const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// Base URL of the media server
    #[serde(default = "default_upstream")]
    pub upstream: String,
    /// Source serving `/library/parts/...`
    #[serde(default)]
    pub default_source: Option<String>,
    #[serde(default)]
    pub context_file: PathBuf,
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: PathBuf,
    #[serde(default = "default_hash_index_file")]
    pub hash_index_file: PathBuf,
    #[serde(default = "default_url_ttl")]
    pub url_ttl_secs: u64,
    #[serde(default = "default_url_cache")]
    pub url_cache_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Seeds for the context file when it does not exist yet
    #[serde(default)]
    pub sources: Vec<SourceContext>,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_upstream() -> String {
    "http://127.0.0.1:32400".to_string()
}

fn default_snapshot_file() -> PathBuf {
    PathBuf::from("sources.json")
}

fn default_hash_index_file() -> PathBuf {
    PathBuf::from("localhash.json")
}

fn default_url_ttl() -> u64 {
    4 * 60 * 60
}

fn default_url_cache() -> u64 {
    10 * 60
}

fn default_request_timeout() -> u64 {
    30
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {:?}", path))?;
        let mut config: AppConfig = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse configuration {:?}", path))?;

        if let Ok(port) = env::var(PORT_ENV) {
            config.port = port
                .parse()
                .with_context(|| format!("Invalid {}: {}", PORT_ENV, port))?;
        }
        config.validate()?;
        debug!(path = %path.display(), sources = config.sources.len(), "Configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.context_file.as_os_str().is_empty() {
            bail!("contextFile must be set");
        }
        if !self.upstream.starts_with("http://") && !self.upstream.starts_with("https://") {
            bail!("upstream must be an http(s) URL: {}", self.upstream);
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_secs)
    }

    /// How long an issued URL may be reused, never longer than it is valid
    pub fn url_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.url_cache_secs.min(self.url_ttl_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where to read the configuration from.
///
/// An explicit `--config` wins, then `FILESRV_CONFIG`, then `config.json` in
/// the working directory, then `filesrv/config.json` in the user's config
/// directory.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("filesrv").join(DEFAULT_CONFIG_FILE))
        .filter(|path| path.exists())
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let file = write_config(r#"{"contextFile": "ctx.json"}"#);
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.bind_address, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(config.upstream, "http://127.0.0.1:32400");
        assert_eq!(config.default_source, None);
        assert_eq!(config.snapshot_file, PathBuf::from("sources.json"));
        assert_eq!(config.hash_index_file, PathBuf::from("localhash.json"));
        assert_eq!(config.url_ttl(), Duration::from_secs(14400));
        assert_eq!(config.url_cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_full_configuration() {
        let file = write_config(
            r#"{
                "port": 9000,
                "bindAddress": "127.0.0.1",
                "upstream": "http://plex:32400",
                "defaultSource": "b2",
                "contextFile": "/var/lib/filesrv/contexts.json",
                "urlTtlSecs": 60,
                "urlCacheSecs": 0,
                "sources": [
                    {"name": "b2", "type": "B2", "context": {"bucketName": "media"}}
                ]
            }"#,
        );
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.default_source.as_deref(), Some("b2"));
        assert_eq!(config.url_ttl_secs, 60);
        assert!(config.url_cache_ttl().is_zero());
        assert_eq!(config.sources[0].kind, "B2");
        assert_eq!(config.sources[0].context["bucketName"], "media");
        if env::var(PORT_ENV).is_err() {
            assert_eq!(config.listen_addr(), "127.0.0.1:9000".parse().unwrap());
        }
    }

    #[test]
    fn test_url_cache_ttl_bounded_by_url_ttl() {
        let file = write_config(r#"{"contextFile": "ctx.json", "urlTtlSecs": 60}"#);
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.url_ttl(), Duration::from_secs(60));
        assert_eq!(config.url_cache_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_context_file_is_required() {
        let file = write_config(r#"{"port": 1}"#);
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("contextFile"));
    }

    #[test]
    fn test_invalid_upstream_rejected() {
        let file = write_config(r#"{"contextFile": "c.json", "upstream": "plex:32400"}"#);
        assert!(AppConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_malformed_and_missing_files() {
        let file = write_config("{ not json");
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse configuration"));

        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let path = resolve_config_path(Some(PathBuf::from("/etc/filesrv.json")));
        assert_eq!(path, PathBuf::from("/etc/filesrv.json"));
    }
}
