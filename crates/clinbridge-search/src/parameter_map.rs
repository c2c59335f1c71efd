//! Per-resource-kind translation of search parameter names to native paths.
//!
//! Tables are TOML documents with one section per resource kind plus a
//! `default` section used as fallback:
//!
//! ```toml
//! [default._id]
//! path = "_key"
//! kind = "special"
//!
//! [Patient.birthdate]
//! path = "birthDate"
//! kind = "date"
//! description = "Date of birth"
//! ```
//!
//! Layers are applied in order; a later layer replaces same-named entries of
//! an earlier one, so a name never maps to more than one path per kind.

use std::collections::HashMap;
use std::str::FromStr;

use clinbridge_core::ResourceType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::parameters::SearchParameterType;
use crate::schema::SchemaRegistry;

/// Section name of the fallback table.
pub const DEFAULT_SECTION: &str = "default";

/// Built-in table shipped with the crate.
pub const BUILTIN_PARAMETERS: &str = include_str!("../parameters/default.toml");

#[derive(Debug, Error)]
pub enum ParameterMapError {
    #[error("Failed to parse parameter table '{source_name}': {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("Unknown resource type '{section}' in parameter table '{source_name}'")]
    UnknownResourceType {
        source_name: String,
        section: String,
    },

    #[error("Failed to read parameter table {path}: {message}")]
    Io { path: String, message: String },
}

/// Native translation of one external search parameter name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMapping {
    /// Dotted native field path.
    pub path: String,
    pub kind: SearchParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target kind for reference parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ResourceType>,
}

impl ParameterMapping {
    pub fn new(path: impl Into<String>, kind: SearchParameterType) -> Self {
        Self {
            path: path.into(),
            kind,
            description: None,
            target: None,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: ResourceType) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

type Table = IndexMap<String, ParameterMapping>;

/// Immutable parameter table; build it with [`ParameterMapBuilder`].
#[derive(Debug, Default, Clone)]
pub struct ParameterMap {
    default: Table,
    kinds: HashMap<ResourceType, Table>,
}

/// A parameter as advertised in capability output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SearchParameterType,
    /// Type derived from the native schema, when the path could be walked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferred: Option<SearchParameterType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterMap {
    pub fn builder() -> ParameterMapBuilder {
        ParameterMapBuilder::default()
    }

    /// The built-in table alone.
    pub fn builtin() -> Result<Self, ParameterMapError> {
        Ok(Self::builder().builtin()?.build())
    }

    /// Look up `name` in the kind's table, then in the default table.
    pub fn resolve(&self, kind: ResourceType, name: &str) -> Option<&ParameterMapping> {
        self.kinds
            .get(&kind)
            .and_then(|table| table.get(name))
            .or_else(|| self.default.get(name))
    }

    pub fn has_table(&self, kind: ResourceType) -> bool {
        self.kinds.contains_key(&kind)
    }

    /// Effective table for a kind: default entries overlaid by kind entries.
    pub fn effective(&self, kind: ResourceType) -> IndexMap<&str, &ParameterMapping> {
        let mut merged: IndexMap<&str, &ParameterMapping> = self
            .default
            .iter()
            .map(|(name, mapping)| (name.as_str(), mapping))
            .collect();
        if let Some(table) = self.kinds.get(&kind) {
            for (name, mapping) in table {
                merged.insert(name.as_str(), mapping);
            }
        }
        merged
    }

    /// Describe every parameter for a kind, inferring types from the schema.
    pub fn describe(&self, kind: ResourceType, schema: &SchemaRegistry) -> Vec<ParameterDescription> {
        self.effective(kind)
            .into_iter()
            .map(|(name, mapping)| ParameterDescription {
                name: name.to_string(),
                kind: mapping.kind,
                inferred: schema.infer(kind, &mapping.path).ok(),
                description: mapping.description.clone(),
            })
            .collect()
    }
}

/// Applies tables in order: built-in defaults first, then site overrides.
#[derive(Debug, Default)]
pub struct ParameterMapBuilder {
    map: ParameterMap,
}

impl ParameterMapBuilder {
    /// Apply the built-in table.
    pub fn builtin(self) -> Result<Self, ParameterMapError> {
        self.layer("builtin", BUILTIN_PARAMETERS)
    }

    /// Apply a TOML table on top of what is already present.
    pub fn layer(mut self, source_name: &str, text: &str) -> Result<Self, ParameterMapError> {
        let sections: IndexMap<String, Table> =
            toml::from_str(text).map_err(|e| ParameterMapError::Parse {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;

        for (section, table) in sections {
            let target = if section == DEFAULT_SECTION {
                &mut self.map.default
            } else {
                let kind = ResourceType::from_str(&section).map_err(|_| {
                    ParameterMapError::UnknownResourceType {
                        source_name: source_name.to_string(),
                        section: section.clone(),
                    }
                })?;
                self.map.kinds.entry(kind).or_default()
            };
            let count = table.len();
            target.extend(table);
            debug!(source = %source_name, section = %section, count, "Applied parameter table");
        }
        Ok(self)
    }

    /// Insert a single mapping.
    #[must_use]
    pub fn mapping(
        mut self,
        kind: Option<ResourceType>,
        name: impl Into<String>,
        mapping: ParameterMapping,
    ) -> Self {
        let table = match kind {
            Some(kind) => self.map.kinds.entry(kind).or_default(),
            None => &mut self.map.default,
        };
        table.insert(name.into(), mapping);
        self
    }

    pub fn build(self) -> ParameterMap {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_parses() {
        let map = ParameterMap::builtin().unwrap();
        assert!(map.resolve(ResourceType::Patient, "_id").is_some());
        assert!(map.has_table(ResourceType::Patient));
        assert_eq!(
            map.resolve(ResourceType::Observation, "subject").and_then(|m| m.target),
            Some(ResourceType::Patient)
        );
    }

    #[test]
    fn test_kind_table_before_default() {
        let map = ParameterMap::builder()
            .mapping(None, "status", ParameterMapping::new("status", SearchParameterType::String))
            .mapping(
                Some(ResourceType::Observation),
                "status",
                ParameterMapping::new("statusConceptKey", SearchParameterType::Token),
            )
            .build();
        assert_eq!(
            map.resolve(ResourceType::Observation, "status").unwrap().path,
            "statusConceptKey"
        );
        // Kinds without a table fall back to the default table.
        assert_eq!(map.resolve(ResourceType::Flag, "status").unwrap().path, "status");
        assert!(map.resolve(ResourceType::Flag, "nothing").is_none());
    }

    #[test]
    fn test_override_layer_replaces_entries() {
        let map = ParameterMap::builder()
            .builtin()
            .unwrap()
            .layer(
                "site",
                r#"
                [Patient.birthdate]
                path = "dob"
                kind = "date"

                [Patient.mrn]
                path = "identifiers"
                kind = "identifier"
                "#,
            )
            .unwrap()
            .build();
        assert_eq!(map.resolve(ResourceType::Patient, "birthdate").unwrap().path, "dob");
        assert!(map.resolve(ResourceType::Patient, "mrn").is_some());
        // Untouched built-ins survive.
        assert!(map.resolve(ResourceType::Patient, "family").is_some());
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let err = ParameterMap::builder()
            .layer("bad", "[Spaceship.name]\npath = \"x\"\nkind = \"string\"\n")
            .unwrap_err();
        assert!(matches!(err, ParameterMapError::UnknownResourceType { .. }));
    }

    #[test]
    fn test_malformed_layer() {
        let err = ParameterMap::builder()
            .layer("bad", "[Patient.name]\npath = \"x\"\nkind = \"colour\"\n")
            .unwrap_err();
        assert!(matches!(err, ParameterMapError::Parse { .. }));
    }

    #[test]
    fn test_effective_table_overlays_default() {
        let map = ParameterMap::builtin().unwrap();
        let effective = map.effective(ResourceType::Patient);
        assert!(effective.contains_key("_id"));
        assert!(effective.contains_key("birthdate"));
    }

    #[test]
    fn test_describe_infers_types_from_schema() {
        use crate::schema::SchemaRegistry;

        let map = ParameterMap::builder()
            .builtin()
            .unwrap()
            .mapping(
                Some(ResourceType::Observation),
                "value-concept",
                ParameterMapping::new("value.(CodedValue).conceptKey", SearchParameterType::Token),
            )
            .build();
        let schema = SchemaRegistry::builtin();
        let described = map.describe(ResourceType::Observation, &schema);

        let find = |name: &str| described.iter().find(|d| d.name == name).unwrap();
        assert_eq!(find("value-concept").inferred, Some(SearchParameterType::Token));
        assert_eq!(find("value-quantity").inferred, Some(SearchParameterType::Number));
        assert_eq!(find("date").inferred, Some(SearchParameterType::Date));
        assert_eq!(find("_id").inferred, Some(SearchParameterType::Special));
        // Default-table entries are listed alongside the kind's own.
        assert!(described.iter().any(|d| d.name == "subject"));
    }
}
