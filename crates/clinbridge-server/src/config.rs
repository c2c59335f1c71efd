use std::path::PathBuf;

use clinbridge_config::MergedConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Site parameter map overrides
    #[serde(default)]
    pub parameters: ParametersConfig,
}

impl AppConfig {
    /// Deserialize the merged layers into typed settings and validate them.
    pub fn from_merged(merged: &MergedConfig) -> Result<Self, String> {
        let cfg: Self = merged.deserialize().map_err(|e| e.to_string())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.base_url.trim().is_empty() {
            return Err("server.base_url must not be empty".into());
        }
        if self.search.default_count == 0 {
            return Err("search.default_count must be > 0".into());
        }
        if self.search.max_count == 0 {
            return Err("search.max_count must be > 0".into());
        }
        if self.search.default_count > self.search.max_count {
            return Err("search.default_count must be <= search.max_count".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Absolute base used for `fullUrl` and bundle links.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}
fn default_base_url() -> String {
    "http://localhost:8080/fhir".into()
}
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_default")]
    pub default_count: usize,
    #[serde(default = "default_search_max")]
    pub max_count: usize,
    #[serde(default = "default_max_include")]
    pub max_include: usize,
}
fn default_search_default() -> usize {
    clinbridge_search::rewriter::DEFAULT_COUNT
}
fn default_search_max() -> usize {
    clinbridge_search::rewriter::DEFAULT_MAX_COUNT
}
fn default_max_include() -> usize {
    clinbridge_engine::DEFAULT_MAX_INCLUDE
}
impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_count: default_search_default(),
            max_count: default_search_max(),
            max_include: default_max_include(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParametersConfig {
    /// TOML file layered over the built-in parameter tables.
    #[serde(default)]
    pub overrides: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinbridge_config::{PartialConfig, SourceKind};
    use serde_json::json;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::from_merged(&MergedConfig::defaults()).unwrap();
        assert_eq!(cfg.search.default_count, 100);
        assert_eq!(cfg.search.max_count, 1000);
        assert_eq!(cfg.search.max_include, 100);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.parameters.overrides.is_none());
    }

    #[test]
    fn test_merged_overrides() {
        let mut merged = MergedConfig::defaults();
        merged.merge(
            PartialConfig {
                search: Some(json!({ "max_include": 5 })),
                parameters: Some(json!({ "overrides": "/etc/clinbridge/params.toml" })),
                ..Default::default()
            },
            SourceKind::File,
        );
        let cfg = AppConfig::from_merged(&merged).unwrap();
        assert_eq!(cfg.search.max_include, 5);
        assert_eq!(cfg.search.default_count, 100);
        assert_eq!(
            cfg.parameters.overrides,
            Some(PathBuf::from("/etc/clinbridge/params.toml"))
        );
    }

    #[test]
    fn test_rejects_unknown_level() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));
    }

    #[test]
    fn test_rejects_zero_default_count() {
        let mut cfg = AppConfig::default();
        cfg.search.default_count = 0;
        assert!(cfg.validate().is_err());
    }
}
