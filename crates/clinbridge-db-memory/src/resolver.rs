//! Table-backed resolvers.

use async_trait::async_trait;
use clinbridge_core::{FhirError, Result};
use clinbridge_storage::{
    AuthorityDescriptor, AuthorityResolver, ConceptDescriptor, ConceptResolver,
};

/// Strip scheme and OID prefixes so `http://acme.org/mrn` and `acme.org/mrn`
/// compare equal.
fn normalize_system(system: &str) -> &str {
    let trimmed = system.trim().trim_end_matches('/');
    ["urn:oid:", "https://", "http://"]
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed)
}

#[derive(Debug, Default, Clone)]
pub struct MemoryAuthorityResolver {
    authorities: Vec<AuthorityDescriptor>,
}

impl MemoryAuthorityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_authority(mut self, authority: AuthorityDescriptor) -> Self {
        self.authorities.push(authority);
        self
    }
}

#[async_trait]
impl AuthorityResolver for MemoryAuthorityResolver {
    async fn resolve(&self, system: &str) -> Result<Option<AuthorityDescriptor>> {
        let wanted = normalize_system(system);
        let mut candidates = self.authorities.iter().filter(|a| {
            a.name == wanted
                || a.key == wanted
                || a.uri.as_deref().map(normalize_system) == Some(wanted)
        });
        let first = candidates.next().cloned();
        if candidates.next().is_some() {
            return Err(FhirError::ambiguous_reference(format!(
                "more than one authority matches system '{system}'"
            )));
        }
        Ok(first)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryConceptResolver {
    concepts: Vec<ConceptDescriptor>,
}

impl MemoryConceptResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_concept(mut self, concept: ConceptDescriptor) -> Self {
        self.concepts.push(concept);
        self
    }
}

#[async_trait]
impl ConceptResolver for MemoryConceptResolver {
    async fn resolve(&self, code: &str, system: Option<&str>) -> Result<Option<ConceptDescriptor>> {
        let wanted = system.map(normalize_system);
        let mut candidates = self.concepts.iter().filter(|c| {
            c.code == code
                && match wanted {
                    Some(w) => c.system.as_deref().map(normalize_system) == Some(w),
                    None => true,
                }
        });
        let first = candidates.next().cloned();
        if candidates.next().is_some() {
            return Err(FhirError::ambiguous_reference(format!(
                "more than one concept matches code '{code}'"
            )));
        }
        Ok(first)
    }

    async fn resolve_all(&self, code: &str) -> Result<Vec<ConceptDescriptor>> {
        Ok(self.concepts.iter().filter(|c| c.code == code).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinbridge_core::ErrorKind;

    fn authority(key: &str, uri: &str) -> AuthorityDescriptor {
        AuthorityDescriptor {
            key: key.to_string(),
            name: key.to_string(),
            uri: Some(uri.to_string()),
        }
    }

    fn concept(key: &str, code: &str, system: &str) -> ConceptDescriptor {
        ConceptDescriptor {
            key: key.to_string(),
            code: code.to_string(),
            system: Some(system.to_string()),
        }
    }

    #[tokio::test]
    async fn test_authority_by_uri_and_name() {
        let resolver =
            MemoryAuthorityResolver::new().with_authority(authority("acme.org/mrn", "http://acme.org/mrn"));
        let by_uri = resolver.resolve("http://acme.org/mrn").await.unwrap().unwrap();
        assert_eq!(by_uri.key, "acme.org/mrn");
        assert!(resolver.resolve("acme.org/mrn").await.unwrap().is_some());
        assert!(resolver.resolve("http://other.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authority_oid() {
        let resolver = MemoryAuthorityResolver::new().with_authority(authority("ssn", "urn:oid:2.16.840.1"));
        assert!(resolver.resolve("2.16.840.1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ambiguous_concept() {
        let resolver = MemoryConceptResolver::new()
            .with_concept(concept("c1", "active", "http://a.org/status"))
            .with_concept(concept("c2", "active", "http://b.org/status"));
        let err = resolver.resolve("active", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousReference);

        let scoped = resolver.resolve("active", Some("http://b.org/status")).await.unwrap();
        assert_eq!(scoped.unwrap().key, "c2");
    }

    #[tokio::test]
    async fn test_resolve_all_spans_systems() {
        let resolver = MemoryConceptResolver::new()
            .with_concept(concept("c1", "active", "http://a.org/status"))
            .with_concept(concept("c2", "active", "http://b.org/status"))
            .with_concept(concept("c3", "inactive", "http://a.org/status"));
        let keys: Vec<String> = resolver
            .resolve_all("active")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(keys, vec!["c1", "c2"]);
        assert!(resolver.resolve_all("unknown").await.unwrap().is_empty());
    }
}
