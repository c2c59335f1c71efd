//! Configuration merging with priority ordering
//!
//! Priority order (lowest to highest):
//! 1. Defaults - Hardcoded sane defaults
//! 2. File config - From clinbridge.toml
//! 3. Environment variables - CLINBRIDGE__* pattern

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ConfigError;

/// Configuration categories known to the merger.
pub const CATEGORIES: [&str; 4] = ["server", "search", "logging", "parameters"];

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Default,
    File,
    Environment,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::File => write!(f, "file"),
            Self::Environment => write!(f, "environment"),
        }
    }
}

/// Priority levels for configuration sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Default = 0,
    File = 10,
    Environment = 30,
}

impl From<SourceKind> for Priority {
    fn from(source: SourceKind) -> Self {
        match source {
            SourceKind::Default => Priority::Default,
            SourceKind::File => Priority::File,
            SourceKind::Environment => Priority::Environment,
        }
    }
}

/// Partial configuration that may have some fields set
///
/// Each category is an `Option<Value>` so a source can override only the
/// keys it knows about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl PartialConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::parse(format!("TOML parse error: {e}")))
    }

    pub fn get_category(&self, category: &str) -> Option<&Value> {
        match category {
            "server" => self.server.as_ref(),
            "search" => self.search.as_ref(),
            "logging" => self.logging.as_ref(),
            "parameters" => self.parameters.as_ref(),
            _ => None,
        }
    }

    fn category_mut(&mut self, category: &str) -> Option<&mut Option<Value>> {
        match category {
            "server" => Some(&mut self.server),
            "search" => Some(&mut self.search),
            "logging" => Some(&mut self.logging),
            "parameters" => Some(&mut self.parameters),
            _ => None,
        }
    }

    /// Set `category.path...` to `value`, creating objects along the way.
    ///
    /// Returns `false` for unknown categories.
    pub fn set_path(&mut self, category: &str, path: &[&str], value: Value) -> bool {
        let Some(slot) = self.category_mut(category) else {
            return false;
        };
        let mut current = slot.get_or_insert_with(|| Value::Object(Default::default()));
        for segment in path {
            if !current.is_object() {
                *current = Value::Object(Default::default());
            }
            let Value::Object(map) = current else {
                return false;
            };
            current = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
        }
        *current = value;
        true
    }

    pub fn is_empty(&self) -> bool {
        CATEGORIES.iter().all(|c| self.get_category(c).is_none())
    }
}

/// Merged configuration with tracking of value sources
#[derive(Debug, Clone)]
pub struct MergedConfig {
    /// Merged configuration as JSON
    config: Value,
    /// Track which source each top-level key came from
    sources: HashMap<String, SourceKind>,
}

impl MergedConfig {
    /// Create with default values
    pub fn defaults() -> Self {
        let config = serde_json::json!({
            "server": {
                "base_url": "http://localhost:8080/fhir"
            },
            "search": {
                "default_count": 100,
                "max_count": 1000,
                "max_include": 100
            },
            "logging": {
                "level": "info"
            },
            "parameters": {}
        });

        let sources = CATEGORIES
            .iter()
            .map(|key| (key.to_string(), SourceKind::Default))
            .collect();

        Self { config, sources }
    }

    /// Merge a partial config with given priority
    pub fn merge(&mut self, partial: PartialConfig, source: SourceKind) {
        let priority = Priority::from(source);

        for category in CATEGORIES {
            let Some(new_value) = partial.get_category(category) else {
                continue;
            };
            let should_override = self
                .sources
                .get(category)
                .is_none_or(|&existing| Priority::from(existing) <= priority);
            if !should_override {
                continue;
            }

            if let Some(existing) = self.config.get_mut(category) {
                deep_merge(existing, new_value.clone());
            } else {
                self.config[category] = new_value.clone();
            }
            self.sources.insert(category.to_string(), source);
        }
    }

    pub fn as_json(&self) -> &Value {
        &self.config
    }

    pub fn get_category(&self, category: &str) -> Option<&Value> {
        self.config.get(category)
    }

    pub fn get_source(&self, category: &str) -> Option<SourceKind> {
        self.sources.get(category).copied()
    }

    /// Validate the merged configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(server) = self.config.get("server")
            && server
                .get("base_url")
                .and_then(Value::as_str)
                .is_some_and(|url| url.trim().is_empty())
        {
            return Err(ConfigError::validation("server.base_url must not be empty"));
        }

        if let Some(search) = self.config.get("search") {
            let default_count = search
                .get("default_count")
                .and_then(Value::as_u64)
                .unwrap_or(100);
            let max_count = search.get("max_count").and_then(Value::as_u64).unwrap_or(1000);

            if max_count == 0 {
                return Err(ConfigError::validation("search.max_count must be > 0"));
            }
            if default_count > max_count {
                return Err(ConfigError::validation(
                    "search.default_count must be <= search.max_count",
                ));
            }
        }

        Ok(())
    }

    /// Convert to a specific config type
    pub fn deserialize<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(self.config.clone())
            .map_err(|e| ConfigError::parse(format!("Failed to deserialize config: {e}")))
    }
}

/// Deep merge two JSON values (right takes precedence for conflicts)
fn deep_merge(left: &mut Value, right: Value) {
    match (left, right) {
        (Value::Object(left_map), Value::Object(right_map)) => {
            for (key, right_value) in right_map {
                if let Some(left_value) = left_map.get_mut(&key) {
                    deep_merge(left_value, right_value);
                } else {
                    left_map.insert(key, right_value);
                }
            }
        }
        (left, right) => {
            *left = right;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = MergedConfig::defaults();
        assert_eq!(config.get_category("search").unwrap()["default_count"], 100);
        assert_eq!(config.get_source("server"), Some(SourceKind::Default));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_keeps_sibling_defaults() {
        let mut config = MergedConfig::defaults();
        config.merge(
            PartialConfig {
                search: Some(json!({ "max_count": 200 })),
                ..Default::default()
            },
            SourceKind::File,
        );

        let search = config.get_category("search").unwrap();
        assert_eq!(search["max_count"], 200);
        assert_eq!(search["default_count"], 100);
        assert_eq!(config.get_source("search"), Some(SourceKind::File));
    }

    #[test]
    fn test_lower_priority_does_not_override() {
        let mut config = MergedConfig::defaults();
        config.merge(
            PartialConfig {
                logging: Some(json!({ "level": "debug" })),
                ..Default::default()
            },
            SourceKind::Environment,
        );
        config.merge(
            PartialConfig {
                logging: Some(json!({ "level": "warn" })),
                ..Default::default()
            },
            SourceKind::File,
        );
        assert_eq!(config.get_category("logging").unwrap()["level"], "debug");
    }

    #[test]
    fn test_deep_merge() {
        let mut left = json!({"a": {"b": 1, "c": 2}});
        deep_merge(&mut left, json!({"a": {"c": 3, "d": 4}}));
        assert_eq!(left, json!({"a": {"b": 1, "c": 3, "d": 4}}));
    }

    #[test]
    fn test_set_path() {
        let mut partial = PartialConfig::new();
        assert!(partial.set_path("search", &["max_count"], json!(5)));
        assert!(partial.set_path("parameters", &["overrides"], json!("/etc/params.toml")));
        assert!(!partial.set_path("storage", &["host"], json!("x")));
        assert_eq!(partial.search, Some(json!({"max_count": 5})));
        assert!(!partial.is_empty());
    }

    #[test]
    fn test_validation_rejects_inverted_counts() {
        let mut config = MergedConfig::defaults();
        config.merge(
            PartialConfig {
                search: Some(json!({ "default_count": 50, "max_count": 10 })),
                ..Default::default()
            },
            SourceKind::File,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_from_toml() {
        let partial = PartialConfig::from_toml(
            r#"
[server]
base_url = "https://fhir.example.org"

[parameters]
overrides = "site-params.toml"
"#,
        )
        .unwrap();
        assert!(partial.server.is_some());
        assert!(partial.parameters.is_some());
        assert!(partial.search.is_none());
    }
}
