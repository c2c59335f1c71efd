//! Environment variable configuration source
//!
//! `CLINBRIDGE__SEARCH__MAX_COUNT=500` sets `search.max_count = 500`.
//! Values that parse as JSON scalars (numbers, booleans) keep their type;
//! everything else is a string.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::ConfigError;
use crate::merger::{PartialConfig, SourceKind};
use crate::sources::ConfigSource;

pub const ENV_PREFIX: &str = "CLINBRIDGE";

#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    vars: Vec<(String, String)>,
}

impl EnvSource {
    /// Snapshot of the current process environment.
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let prefix = format!("{ENV_PREFIX}__");
        Self {
            vars: vars
                .into_iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .collect(),
        }
    }
}

fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_))) => value,
        _ => Value::String(raw.to_string()),
    }
}

#[async_trait]
impl ConfigSource for EnvSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Environment
    }

    async fn load(&self) -> Result<PartialConfig, ConfigError> {
        let mut partial = PartialConfig::new();
        for (key, raw) in &self.vars {
            let lowered = key.to_ascii_lowercase();
            let mut segments = lowered.split("__").skip(1);
            let Some(category) = segments.next() else {
                continue;
            };
            let path: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();
            if path.is_empty() || !partial.set_path(category, &path, parse_value(raw)) {
                debug!(variable = %key, "Ignoring unrecognised configuration variable");
            }
        }
        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(vars: &[(&str, &str)]) -> EnvSource {
        EnvSource::from_vars(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[tokio::test]
    async fn test_maps_sections_and_keys() {
        let partial = source(&[
            ("CLINBRIDGE__SEARCH__MAX_COUNT", "500"),
            ("CLINBRIDGE__SERVER__BASE_URL", "https://fhir.example.org"),
            ("CLINBRIDGE__LOGGING__LEVEL", "debug"),
        ])
        .load()
        .await
        .unwrap();
        assert_eq!(partial.search, Some(json!({"max_count": 500})));
        assert_eq!(partial.server, Some(json!({"base_url": "https://fhir.example.org"})));
        assert_eq!(partial.logging, Some(json!({"level": "debug"})));
    }

    #[tokio::test]
    async fn test_ignores_foreign_and_unknown_vars() {
        let partial = source(&[
            ("PATH", "/usr/bin"),
            ("CLINBRIDGE__STORAGE__HOST", "db"),
            ("CLINBRIDGE__SEARCH", "x"),
        ])
        .load()
        .await
        .unwrap();
        assert!(partial.is_empty());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("info"), json!("info"));
        assert_eq!(parse_value("[1]"), json!("[1]"));
    }
}
