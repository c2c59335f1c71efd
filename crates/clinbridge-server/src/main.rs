use std::env;
use std::path::PathBuf;

use clinbridge_server::{AppConfig, AppContext, shutdown_tracing};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigPathSource {
    /// From --config CLI argument
    CliArgument,
    /// From CLINBRIDGE_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (clinbridge.toml)
    Default,
}

impl std::fmt::Display for ConfigPathSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (CLINBRIDGE_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Tracing starts at the default level; the configured level is applied after loading.
    clinbridge_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();

    let merged = match clinbridge_config::load_layered(Some(config_path.as_path())).await {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    let cfg = match AppConfig::from_merged(&merged) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path.display(),
        source = %source,
        "Configuration loaded"
    );
    clinbridge_server::observability::apply_logging_level(&cfg.logging.level);

    let app = match AppContext::build(cfg).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Startup failed: {e:#}");
            std::process::exit(2);
        }
    };

    for descriptor in app.registry.list_all() {
        let parameters = match app.describe(descriptor.kind).await {
            Ok(described) => described.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to describe search parameters");
                0
            }
        };
        tracing::debug!(
            resource_type = %descriptor.kind,
            native_type = %descriptor.native_type,
            parameters,
            "Handler registered"
        );
    }
    tracing::info!("Clinbridge adapter running; press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    shutdown_tracing();
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: CLINBRIDGE_CONFIG
/// 3. Default: clinbridge.toml
fn resolve_config_path() -> (PathBuf, ConfigPathSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return (PathBuf::from(path), ConfigPathSource::CliArgument);
        }
    }

    if let Ok(path) = env::var("CLINBRIDGE_CONFIG")
        && !path.is_empty()
    {
        return (PathBuf::from(path), ConfigPathSource::EnvironmentVariable);
    }

    (PathBuf::from("clinbridge.toml"), ConfigPathSource::Default)
}
