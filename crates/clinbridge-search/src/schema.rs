//! Declarative native schema used to infer search parameter types.
//!
//! Each resource kind is rooted at a named native type. A field path is
//! walked segment by segment: collections are dereferenced transparently and
//! a `(TypeName)` segment re-types the current value, e.g.
//! `value.(Quantity).value`.

use std::collections::HashMap;

use clinbridge_core::ResourceType;
use clinbridge_storage::{KEY_FIELD, RECORDED_FIELD};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parameters::SearchParameterType;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("No native schema registered for {0}")]
    UnknownResourceType(ResourceType),

    #[error("Unknown native type '{0}'")]
    UnknownType(String),

    #[error("Type '{type_name}' has no field '{field}'")]
    UnknownField { type_name: String, field: String },

    #[error("Cannot descend into primitive at '{0}'")]
    NotAnObject(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Code,
    Uri,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
}

impl PrimitiveType {
    pub fn search_type(&self) -> SearchParameterType {
        match self {
            Self::String => SearchParameterType::String,
            Self::Uri => SearchParameterType::Uri,
            Self::Integer | Self::Decimal => SearchParameterType::Number,
            Self::Date | Self::DateTime => SearchParameterType::Date,
            Self::Code | Self::Boolean => SearchParameterType::Token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Primitive(PrimitiveType),
    /// A nested value of the named native type.
    Object(String),
    Collection(Box<FieldType>),
}

impl FieldType {
    pub fn object(type_name: impl Into<String>) -> Self {
        Self::Object(type_name.into())
    }

    pub fn collection(item: FieldType) -> Self {
        Self::Collection(Box::new(item))
    }

    fn element(&self) -> &FieldType {
        match self {
            Self::Collection(item) => item.element(),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSchema {
    pub fields: IndexMap<String, FieldType>,
}

impl TypeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }
}

/// Schema tables built once at startup.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    types: HashMap<String, TypeSchema>,
    roots: HashMap<ResourceType, String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_type(mut self, name: impl Into<String>, schema: TypeSchema) -> Self {
        self.types.insert(name.into(), schema);
        self
    }

    /// Bind a resource kind to its root native type.
    #[must_use]
    pub fn with_root(mut self, kind: ResourceType, type_name: impl Into<String>) -> Self {
        self.roots.insert(kind, type_name.into());
        self
    }

    /// Infer the search parameter type of a native path.
    pub fn infer(&self, kind: ResourceType, path: &str) -> Result<SearchParameterType, SchemaError> {
        match path {
            KEY_FIELD => return Ok(SearchParameterType::Special),
            RECORDED_FIELD => return Ok(SearchParameterType::Date),
            _ => {}
        }

        let root = self
            .roots
            .get(&kind)
            .ok_or(SchemaError::UnknownResourceType(kind))?;
        let mut current = FieldType::Object(root.clone());

        for segment in path.split('.').filter(|s| !s.is_empty()) {
            if let Some(cast) = segment.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
                if !self.types.contains_key(cast) {
                    return Err(SchemaError::UnknownType(cast.to_string()));
                }
                current = FieldType::Object(cast.to_string());
                continue;
            }

            let type_name = match current.element() {
                FieldType::Object(name) => name.clone(),
                _ => return Err(SchemaError::NotAnObject(segment.to_string())),
            };
            let schema = self
                .types
                .get(&type_name)
                .ok_or_else(|| SchemaError::UnknownType(type_name.clone()))?;
            current = schema
                .fields
                .get(segment)
                .cloned()
                .ok_or_else(|| SchemaError::UnknownField {
                    type_name,
                    field: segment.to_string(),
                })?;
        }

        Ok(match current.element() {
            FieldType::Primitive(p) => p.search_type(),
            _ => SearchParameterType::Composite,
        })
    }
}

/// Native type name of the root record for `kind`.
pub fn root_type_name(kind: ResourceType) -> String {
    format!("{kind}Record")
}

fn primitive(p: PrimitiveType) -> FieldType {
    FieldType::Primitive(p)
}

/// Fields every built-in root record carries.
fn record_base() -> TypeSchema {
    TypeSchema::new()
        .field("identifiers", FieldType::collection(FieldType::object("IdentifierRecord")))
        .field("tags", FieldType::collection(FieldType::object("TagRecord")))
        .field("statusConceptKey", primitive(PrimitiveType::Code))
        .field("subjectKey", primitive(PrimitiveType::Code))
}

impl SchemaRegistry {
    /// Native schema matching the built-in parameter tables.
    pub fn builtin() -> Self {
        let roots = [
            (
                ResourceType::Patient,
                record_base()
                    .field("name", primitive(PrimitiveType::String))
                    .field("familyName", primitive(PrimitiveType::String))
                    .field("givenNames", FieldType::collection(primitive(PrimitiveType::String)))
                    .field("birthDate", primitive(PrimitiveType::Date))
                    .field("genderConceptKey", primitive(PrimitiveType::Code))
                    .field("deceased", primitive(PrimitiveType::Boolean))
                    .field("active", primitive(PrimitiveType::Boolean))
                    .field("managingOrganizationKey", primitive(PrimitiveType::Code))
                    .field(
                        "generalPractitionerKey",
                        FieldType::collection(primitive(PrimitiveType::Code)),
                    ),
            ),
            (
                ResourceType::Practitioner,
                record_base()
                    .field("name", primitive(PrimitiveType::String))
                    .field("familyName", primitive(PrimitiveType::String)),
            ),
            (
                ResourceType::Organization,
                record_base()
                    .field("name", primitive(PrimitiveType::String))
                    .field("partOfKey", primitive(PrimitiveType::Code)),
            ),
            (
                ResourceType::Observation,
                record_base()
                    .field("codeConceptKey", primitive(PrimitiveType::Code))
                    .field(
                        "categoryConceptKey",
                        FieldType::collection(primitive(PrimitiveType::Code)),
                    )
                    .field("effective", primitive(PrimitiveType::DateTime))
                    .field("value", FieldType::object("ValueRecord"))
                    .field("encounterKey", primitive(PrimitiveType::Code))
                    .field("performerKey", FieldType::collection(primitive(PrimitiveType::Code))),
            ),
            (
                ResourceType::Encounter,
                record_base()
                    .field("classConceptKey", primitive(PrimitiveType::Code))
                    .field("period", FieldType::object("PeriodRecord"))
                    .field("participantKey", FieldType::collection(primitive(PrimitiveType::Code))),
            ),
            (
                ResourceType::Condition,
                record_base()
                    .field("codeConceptKey", primitive(PrimitiveType::Code))
                    .field("onset", primitive(PrimitiveType::DateTime)),
            ),
            (
                ResourceType::MedicationRequest,
                record_base()
                    .field("medicationKey", primitive(PrimitiveType::Code))
                    .field("authoredOn", primitive(PrimitiveType::DateTime)),
            ),
            (
                ResourceType::Immunization,
                record_base()
                    .field("vaccineConceptKey", primitive(PrimitiveType::Code))
                    .field("occurrence", primitive(PrimitiveType::DateTime)),
            ),
        ];

        let mut registry = Self::new()
            .with_type(
                "IdentifierRecord",
                TypeSchema::new()
                    .field("authority", primitive(PrimitiveType::Code))
                    .field("system", primitive(PrimitiveType::Uri))
                    .field("code", primitive(PrimitiveType::String)),
            )
            .with_type(
                "TagRecord",
                TypeSchema::new()
                    .field("system", primitive(PrimitiveType::Uri))
                    .field("code", primitive(PrimitiveType::Code)),
            )
            .with_type(
                "PeriodRecord",
                TypeSchema::new()
                    .field("start", primitive(PrimitiveType::DateTime))
                    .field("end", primitive(PrimitiveType::DateTime)),
            )
            // Observation values are polymorphic; casts select the concrete shape.
            .with_type(
                "ValueRecord",
                TypeSchema::new()
                    .field("value", primitive(PrimitiveType::Decimal))
                    .field("unit", primitive(PrimitiveType::String)),
            )
            .with_type(
                "Quantity",
                TypeSchema::new()
                    .field("value", primitive(PrimitiveType::Decimal))
                    .field("unit", primitive(PrimitiveType::String))
                    .field("system", primitive(PrimitiveType::Uri))
                    .field("code", primitive(PrimitiveType::Code)),
            )
            .with_type(
                "CodedValue",
                TypeSchema::new()
                    .field("conceptKey", primitive(PrimitiveType::Code))
                    .field("text", primitive(PrimitiveType::String)),
            );
        for (kind, schema) in roots {
            let name = root_type_name(kind);
            registry = registry.with_type(name.clone(), schema).with_root(kind, name);
        }
        registry
    }

    pub fn has_root(&self, kind: ResourceType) -> bool {
        self.roots.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_root(ResourceType::Patient, "PatientRecord")
            .with_root(ResourceType::Observation, "ObservationRecord")
            .with_type(
                "PatientRecord",
                TypeSchema::new()
                    .field("name", FieldType::Primitive(PrimitiveType::String))
                    .field("birthDate", FieldType::Primitive(PrimitiveType::Date))
                    .field(
                        "identifiers",
                        FieldType::collection(FieldType::object("IdentifierRecord")),
                    ),
            )
            .with_type(
                "IdentifierRecord",
                TypeSchema::new()
                    .field("authority", FieldType::Primitive(PrimitiveType::Code))
                    .field("system", FieldType::Primitive(PrimitiveType::Uri))
                    .field("code", FieldType::Primitive(PrimitiveType::String)),
            )
            .with_type(
                "ObservationRecord",
                TypeSchema::new().field("value", FieldType::object("ValueRecord")),
            )
            .with_type("ValueRecord", TypeSchema::new())
            .with_type(
                "Quantity",
                TypeSchema::new().field("value", FieldType::Primitive(PrimitiveType::Decimal)),
            )
    }

    #[test]
    fn test_infer_primitives() {
        let schema = registry();
        assert_eq!(schema.infer(ResourceType::Patient, "name"), Ok(SearchParameterType::String));
        assert_eq!(schema.infer(ResourceType::Patient, "birthDate"), Ok(SearchParameterType::Date));
    }

    #[test]
    fn test_infer_through_collection() {
        let schema = registry();
        assert_eq!(
            schema.infer(ResourceType::Patient, "identifiers.system"),
            Ok(SearchParameterType::Uri)
        );
        assert_eq!(
            schema.infer(ResourceType::Patient, "identifiers"),
            Ok(SearchParameterType::Composite)
        );
    }

    #[test]
    fn test_infer_with_cast() {
        let schema = registry();
        assert_eq!(
            schema.infer(ResourceType::Observation, "value.(Quantity).value"),
            Ok(SearchParameterType::Number)
        );
        assert_eq!(
            schema.infer(ResourceType::Observation, "value.(Nope).value"),
            Err(SchemaError::UnknownType("Nope".to_string()))
        );
    }

    #[test]
    fn test_infer_errors() {
        let schema = registry();
        assert!(matches!(
            schema.infer(ResourceType::Patient, "nickname"),
            Err(SchemaError::UnknownField { .. })
        ));
        assert!(matches!(
            schema.infer(ResourceType::Patient, "name.first"),
            Err(SchemaError::NotAnObject(_))
        ));
        assert_eq!(
            schema.infer(ResourceType::Flag, "x"),
            Err(SchemaError::UnknownResourceType(ResourceType::Flag))
        );
        assert_eq!(schema.infer(ResourceType::Flag, KEY_FIELD), Ok(SearchParameterType::Special));
    }

    #[test]
    fn test_builtin_schema() {
        let schema = SchemaRegistry::builtin();
        assert!(schema.has_root(ResourceType::Patient));
        assert!(!schema.has_root(ResourceType::Flag));
        assert_eq!(
            schema.infer(ResourceType::Encounter, "period.start"),
            Ok(SearchParameterType::Date)
        );
        assert_eq!(
            schema.infer(ResourceType::Observation, "value.(CodedValue).conceptKey"),
            Ok(SearchParameterType::Token)
        );
        assert_eq!(
            schema.infer(ResourceType::Patient, "identifiers.code"),
            Ok(SearchParameterType::String)
        );
    }
}
