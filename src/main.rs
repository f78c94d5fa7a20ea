//! filesrv - cache redirector for media-server parts
//!
//! Serves media-server part requests from cloud drives holding
//! content-identical copies of the local files, matched by hash.

mod b2;
mod cache;
mod config;
mod http;
mod onedrive;
mod source;

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use cache::HashIndex;
use config::AppConfig;
use http::{AppState, Upstream};
use source::{ContextStore, SourceDeps, SourceRegistry};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Serve redirects and proxy the media server (default)
    Serve { config: Option<PathBuf> },
    /// Refresh every source inventory, write the snapshot and exit
    Refresh { config: Option<PathBuf> },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"filesrv - Redirect media-server part requests to cloud copies

USAGE:
    filesrv [serve] [--config <path>]
    filesrv refresh [--config <path>]
    filesrv help

COMMANDS:
    serve    Restore sources and serve until Ctrl+C (default)
    refresh  Refresh every source inventory, write the snapshot and exit
    help     Show this help message

ENVIRONMENT:
    FILESRV_CONFIG   Configuration file (default: config.json)
    FILESRV_PORT     Overrides the configured port
    RUST_LOG         Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_config_flag(args: &[String]) -> Result<Option<PathBuf>> {
    match args {
        [] => Ok(None),
        [flag, path] if flag == "--config" || flag == "-c" => Ok(Some(PathBuf::from(path))),
        _ => Err(anyhow!("Usage: filesrv [serve|refresh] [--config <path>]")),
    }
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    let Some(first) = args.get(1) else {
        return Ok(Command::Serve { config: None });
    };

    match first.as_str() {
        "serve" => Ok(Command::Serve {
            config: parse_config_flag(&args[2..])?,
        }),
        "refresh" => Ok(Command::Refresh {
            config: parse_config_flag(&args[2..])?,
        }),
        "--config" | "-c" => Ok(Command::Serve {
            config: parse_config_flag(&args[1..])?,
        }),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", first);
            Ok(Command::Help)
        }
    }
}

/// Everything both commands need: configuration plus restored sources
struct Runtime {
    config: AppConfig,
    registry: Arc<SourceRegistry>,
    client: reqwest::Client,
}

async fn bootstrap(config_path: Option<PathBuf>) -> Result<Runtime> {
    let path = config::resolve_config_path(config_path);
    let config = AppConfig::load(&path)?;
    info!(path = %path.display(), "Using configuration");

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let contexts = Arc::new(ContextStore::open(&config.context_file, config.sources.clone())?);
    let deps = SourceDeps {
        http: client.clone(),
        contexts: Arc::clone(&contexts),
        url_ttl: config.url_ttl(),
        url_cache_ttl: config.url_cache_ttl(),
    };

    let registry = Arc::new(SourceRegistry::with_default_kinds(deps));
    registry
        .restore_all(&contexts.sources(), &config.snapshot_file)
        .await
        .context("Failed to restore cache sources")?;

    if let Some(name) = &config.default_source {
        if !registry.has_source(name).await {
            return Err(anyhow!("Default source {} is not configured", name));
        }
    }

    Ok(Runtime {
        config,
        registry,
        client,
    })
}

async fn serve(runtime: Runtime) -> Result<()> {
    let Runtime {
        config,
        registry,
        client,
    } = runtime;

    let index = Arc::new(HashIndex::open(&config.hash_index_file));
    let upstream = Upstream::new(client, config.upstream.clone());
    let state = AppState::new(
        registry,
        index,
        upstream,
        config.default_source.clone(),
        config.snapshot_file.clone(),
    );
    let app = http::create_router(Arc::new(state));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, upstream = %config.upstream, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    info!("Shutdown complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    match command {
        Command::Serve { config } => {
            info!("Starting filesrv");
            let runtime = match bootstrap(config).await {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!(error = %format!("{:#}", e), "Startup failed");
                    return Err(e);
                }
            };
            serve(runtime).await?;
        }
        Command::Refresh { config } => {
            let runtime = bootstrap(config).await?;
            runtime
                .registry
                .refresh_all(&runtime.config.snapshot_file)
                .await
                .context("Failed to write inventory snapshot")?;
            for status in runtime.registry.statuses().await {
                println!("{}: {} cached files", status.name, status.cached_files);
            }
        }
        Command::Help => {
            print_help();
        }
    }

    Ok(())
}
