//! The repository's native record form.

use clinbridge_core::FhirDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Pseudo-field addressing the native key.
pub const KEY_FIELD: &str = "_key";
/// Pseudo-field addressing the provenance timestamp.
pub const RECORDED_FIELD: &str = "_recorded";

/// What kind of write produced a record version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvenanceAction {
    Create,
    Update,
    Delete,
}

/// Authorship metadata attached before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub recorded_at: FhirDateTime,
    pub action: ProvenanceAction,
}

/// One version of a native record.
///
/// `key` is the native primary key; `version` identifies this version and
/// `previous_version` links to its predecessor when the backend keeps a
/// version chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<FhirDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl NativeRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Resolve a dotted field path.
    ///
    /// Arrays met along the way are flattened, so `name.family` on a record
    /// with two names yields both family values. Nulls are skipped.
    pub fn lookup(&self, path: &str) -> Vec<&Value> {
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let Some(first) = segments.next() else {
            return Vec::new();
        };
        let mut current: Vec<&Value> = self.fields.get(first).into_iter().collect();
        for segment in segments {
            current = current
                .into_iter()
                .flat_map(flatten)
                .filter_map(|v| v.get(segment))
                .collect();
        }
        current
            .into_iter()
            .flat_map(flatten)
            .filter(|v| !v.is_null())
            .collect()
    }

    /// Like [`lookup`](Self::lookup) but also resolves the [`KEY_FIELD`] and
    /// [`RECORDED_FIELD`] pseudo-fields.
    pub fn values(&self, path: &str) -> Vec<Value> {
        match path {
            KEY_FIELD => self.key.iter().map(|k| Value::String(k.clone())).collect(),
            RECORDED_FIELD => self
                .provenance
                .iter()
                .map(|p| Value::String(p.recorded_at.to_string()))
                .collect(),
            _ => self.lookup(path).into_iter().cloned().collect(),
        }
    }
}

fn flatten(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().flat_map(flatten).collect(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> NativeRecord {
        let Value::Object(fields) = json!({
            "status": "active",
            "name": [
                {"family": "Smith", "given": ["Ann", "Marie"]},
                {"family": "Jones"}
            ],
            "deceased": null,
            "subject": {"id": "p1"}
        }) else {
            unreachable!()
        };
        NativeRecord::new(fields).with_key("k1")
    }

    #[test]
    fn test_lookup_scalar() {
        let r = record();
        assert_eq!(r.lookup("status"), vec![&json!("active")]);
        assert_eq!(r.lookup("subject.id"), vec![&json!("p1")]);
    }

    #[test]
    fn test_lookup_flattens_arrays() {
        let r = record();
        assert_eq!(r.lookup("name.family"), vec![&json!("Smith"), &json!("Jones")]);
        assert_eq!(r.lookup("name.given"), vec![&json!("Ann"), &json!("Marie")]);
    }

    #[test]
    fn test_lookup_missing_and_null() {
        let r = record();
        assert!(r.lookup("deceased").is_empty());
        assert!(r.lookup("nope.deeper").is_empty());
        assert!(r.lookup("").is_empty());
    }

    #[test]
    fn test_pseudo_fields() {
        let mut r = record();
        assert_eq!(r.values(KEY_FIELD), vec![json!("k1")]);
        assert!(r.values(RECORDED_FIELD).is_empty());
        r.provenance = Some(Provenance {
            author: None,
            recorded_at: "2024-03-01T10:00:00Z".parse().unwrap(),
            action: ProvenanceAction::Create,
        });
        assert_eq!(r.values(RECORDED_FIELD), vec![json!("2024-03-01T10:00:00Z")]);
    }
}
