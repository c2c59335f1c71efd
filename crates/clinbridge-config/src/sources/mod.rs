//! Configuration sources
//!
//! - File: a TOML file such as `clinbridge.toml`
//! - Environment: `CLINBRIDGE__SECTION__KEY=value` variables

mod env;
mod file;

pub use env::{ENV_PREFIX, EnvSource};
pub use file::FileSource;

use crate::ConfigError;
use crate::merger::{PartialConfig, SourceKind};

use async_trait::async_trait;

/// Trait for configuration sources
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Name of this source (for logging and debugging)
    fn name(&self) -> &str;

    /// Layer this source belongs to; higher layers win in merges.
    fn kind(&self) -> SourceKind;

    /// Load current configuration from this source
    async fn load(&self) -> Result<PartialConfig, ConfigError>;
}
