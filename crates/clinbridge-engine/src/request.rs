use clinbridge_api::Bundle;
use clinbridge_core::{FhirError, ResourceType, Result};
use clinbridge_search::SearchParams;
use serde_json::Value;

use crate::handler::Interaction;

/// One inbound operation, created per call.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRequest {
    pub interaction: Interaction,
    pub kind: ResourceType,
    pub id: Option<String>,
    pub version: Option<String>,
    pub body: Option<Value>,
    pub params: SearchParams,
}

impl InteractionRequest {
    fn new(interaction: Interaction, kind: ResourceType) -> Self {
        Self {
            interaction,
            kind,
            id: None,
            version: None,
            body: None,
            params: SearchParams::new(),
        }
    }

    pub fn create(kind: ResourceType, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Interaction::Create, kind)
        }
    }

    pub fn read(kind: ResourceType, id: impl Into<String>, version: Option<String>) -> Self {
        Self {
            id: Some(id.into()),
            version,
            ..Self::new(Interaction::Read, kind)
        }
    }

    pub fn update(kind: ResourceType, id: impl Into<String>, body: Value) -> Self {
        Self {
            id: Some(id.into()),
            body: Some(body),
            ..Self::new(Interaction::Update, kind)
        }
    }

    pub fn delete(kind: ResourceType, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(Interaction::Delete, kind)
        }
    }

    pub fn search(kind: ResourceType, params: SearchParams) -> Self {
        Self {
            params,
            ..Self::new(Interaction::Search, kind)
        }
    }

    pub fn history(kind: ResourceType, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(Interaction::History, kind)
        }
    }

    pub(crate) fn require_id(&self) -> Result<&str> {
        self.id.as_deref().ok_or_else(|| {
            FhirError::invalid_argument(format!("{} requires a resource id", self.interaction))
        })
    }

    pub(crate) fn require_body(&self) -> Result<&Value> {
        self.body.as_ref().ok_or_else(|| {
            FhirError::invalid_argument(format!("{} requires a resource body", self.interaction))
        })
    }
}

/// Result of [`InteractionEngine::execute`](crate::InteractionEngine::execute).
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionOutcome {
    Resource(Value),
    Bundle(Bundle),
}

impl InteractionOutcome {
    pub fn into_resource(self) -> Result<Value> {
        match self {
            Self::Resource(resource) => Ok(resource),
            Self::Bundle(_) => Err(FhirError::internal("expected a resource, got a bundle")),
        }
    }

    pub fn into_bundle(self) -> Result<Bundle> {
        match self {
            Self::Bundle(bundle) => Ok(bundle),
            Self::Resource(_) => Err(FhirError::internal("expected a bundle, got a resource")),
        }
    }
}
