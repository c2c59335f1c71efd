//! Per-kind handler strategy: descriptor, mapper and repository.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use clinbridge_core::{FhirError, KeyFormat, RequestContext, ResourceType, Result};
use clinbridge_storage::{DynRepository, NativeRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Interactions the engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interaction {
    Create,
    Read,
    Update,
    Delete,
    Search,
    History,
}

impl Interaction {
    pub const ALL: [Interaction; 6] = [
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::Search,
        Self::History,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Search => "search",
            Self::History => "history",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the native model links each version to its predecessor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersioningMode {
    /// Only the current version is reachable.
    None,
    /// Every version points at its predecessor via `previous_version`.
    #[default]
    VersionChain,
}

/// Static description of one served resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTypeDescriptor {
    pub kind: ResourceType,
    /// Name of the native model type behind this kind.
    pub native_type: String,
    /// `resourceType` expected in request bodies.
    pub external_type: String,
    pub interactions: Vec<Interaction>,
    pub versioning: VersioningMode,
    pub key_format: KeyFormat,
}

impl ResourceTypeDescriptor {
    /// Descriptor supporting every interaction, UUID keys and version chains.
    pub fn new(kind: ResourceType, native_type: impl Into<String>) -> Self {
        Self {
            kind,
            native_type: native_type.into(),
            external_type: kind.as_str().to_string(),
            interactions: Interaction::ALL.to_vec(),
            versioning: VersioningMode::default(),
            key_format: KeyFormat::default(),
        }
    }

    #[must_use]
    pub fn with_interactions(mut self, interactions: impl IntoIterator<Item = Interaction>) -> Self {
        self.interactions = interactions.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_versioning(mut self, versioning: VersioningMode) -> Self {
        self.versioning = versioning;
        self
    }

    #[must_use]
    pub fn with_key_format(mut self, key_format: KeyFormat) -> Self {
        self.key_format = key_format;
        self
    }

    pub fn supports(&self, interaction: Interaction) -> bool {
        self.interactions.contains(&interaction)
    }

    /// Check that `body` declares this kind's external type.
    ///
    /// # Errors
    ///
    /// Returns `FhirError::InvalidArgument` for non-object bodies, a missing
    /// `resourceType` or a mismatching one.
    pub fn validate_body(&self, body: &Value) -> Result<()> {
        let Some(object) = body.as_object() else {
            return Err(FhirError::invalid_argument("Resource body must be a JSON object"));
        };
        match object.get("resourceType").and_then(Value::as_str) {
            Some(rt) if rt == self.external_type => Ok(()),
            Some(rt) => Err(FhirError::invalid_argument(format!(
                "Resource type mismatch: expected {}, got {rt}",
                self.external_type
            ))),
            None => Err(FhirError::invalid_argument("Missing resourceType")),
        }
    }
}

/// Translation between the external resource form and the native model.
///
/// One implementation exists per resource kind; the engine never looks
/// inside either representation beyond `resourceType` and `id`.
#[async_trait]
pub trait ResourceMapper: Send + Sync {
    /// Map an external resource into a native record.
    ///
    /// # Errors
    ///
    /// Returns `FhirError::Validation` when the resource cannot be expressed
    /// in the native model.
    async fn to_native(&self, resource: Value, ctx: &RequestContext) -> Result<NativeRecord>;

    /// Map a native record back into its external form.
    async fn to_external(&self, record: NativeRecord, ctx: &RequestContext) -> Result<Value>;
}

pub type DynResourceMapper = Arc<dyn ResourceMapper>;

/// Everything the engine needs to serve one kind.
pub struct ResourceHandler {
    pub descriptor: ResourceTypeDescriptor,
    pub mapper: DynResourceMapper,
    pub repository: DynRepository,
}

impl ResourceHandler {
    pub fn new(
        descriptor: ResourceTypeDescriptor,
        mapper: DynResourceMapper,
        repository: DynRepository,
    ) -> Self {
        Self {
            descriptor,
            mapper,
            repository,
        }
    }

    pub fn kind(&self) -> ResourceType {
        self.descriptor.kind
    }
}

impl fmt::Debug for ResourceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandler")
            .field("descriptor", &self.descriptor)
            .field("backend", &self.repository.backend_name())
            .finish_non_exhaustive()
    }
}
