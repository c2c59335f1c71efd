//! Identifier-authority and concept resolution contracts.

use std::sync::Arc;

use async_trait::async_trait;
use clinbridge_core::Result;
use serde::{Deserialize, Serialize};

/// An identifier-issuing authority known to the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityDescriptor {
    /// Native key of the authority.
    pub key: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// A coded concept known to the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptDescriptor {
    /// Native key of the concept.
    pub key: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

#[async_trait]
pub trait AuthorityResolver: Send + Sync {
    /// Resolves a system given as URI, OID or bare name.
    ///
    /// # Errors
    ///
    /// Returns `FhirError::AmbiguousReference` if more than one authority matches.
    async fn resolve(&self, system: &str) -> Result<Option<AuthorityDescriptor>>;
}

#[async_trait]
pub trait ConceptResolver: Send + Sync {
    /// Resolves a code, optionally scoped to a code system.
    ///
    /// # Errors
    ///
    /// Returns `FhirError::AmbiguousReference` if more than one concept matches.
    async fn resolve(&self, code: &str, system: Option<&str>) -> Result<Option<ConceptDescriptor>>;

    /// Every concept carrying `code`, across all code systems.
    async fn resolve_all(&self, code: &str) -> Result<Vec<ConceptDescriptor>>;
}

pub type DynAuthorityResolver = Arc<dyn AuthorityResolver>;
pub type DynConceptResolver = Arc<dyn ConceptResolver>;
