//! File-based configuration source

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::ConfigError;
use crate::merger::{PartialConfig, SourceKind};
use crate::sources::ConfigSource;

/// TOML configuration file. A missing file contributes nothing.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    async fn load(&self) -> Result<PartialConfig, ConfigError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Config file does not exist");
                return Ok(PartialConfig::new());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        PartialConfig::from_toml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();
        let partial = FileSource::new(file.path()).load().await.unwrap();
        assert_eq!(partial.logging.unwrap()["level"], "debug");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let partial = FileSource::new("/nonexistent/clinbridge.toml")
            .load()
            .await
            .unwrap();
        assert!(partial.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[search\nmax_count = ").unwrap();
        let err = FileSource::new(file.path()).load().await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
