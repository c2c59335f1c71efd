//! Layered configuration for Clinbridge
//!
//! Configuration is assembled from sources in priority order:
//!
//! ```text
//! defaults  <  clinbridge.toml  <  CLINBRIDGE__SECTION__KEY env vars
//! ```
//!
//! Each source yields a [`PartialConfig`]; [`MergedConfig`] deep-merges them
//! and deserializes the result into the caller's typed config.

pub mod merger;
pub mod sources;

use std::path::Path;

use tracing::debug;

pub use merger::{MergedConfig, PartialConfig, Priority, SourceKind};
pub use sources::{ConfigSource, EnvSource, FileSource};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load defaults, then `file` (when given), then the process environment.
pub async fn load_layered(file: Option<&Path>) -> Result<MergedConfig> {
    let mut sources: Vec<Box<dyn ConfigSource>> = Vec::new();
    if let Some(path) = file {
        sources.push(Box::new(FileSource::new(path)));
    }
    sources.push(Box::new(EnvSource::from_process()));
    load_from(&sources).await
}

/// Merge `sources` over the defaults, lowest priority first.
pub async fn load_from(sources: &[Box<dyn ConfigSource>]) -> Result<MergedConfig> {
    let mut ordered: Vec<&dyn ConfigSource> = sources.iter().map(|s| s.as_ref()).collect();
    ordered.sort_by_key(|s| s.kind());

    let mut merged = MergedConfig::defaults();
    for source in ordered {
        let partial = source.load().await?;
        debug!(source = %source.name(), "Merging configuration source");
        merged.merge(partial, source.kind());
    }
    merged.validate()?;
    Ok(merged)
}
