//! Parsing of resource references as they appear in search values and
//! reference fields.
//!
//! Accepted shapes:
//! - bare id: `123`
//! - relative: `Patient/123`, `Patient/123/_history/2`
//! - absolute: `http://example.org/fhir/Patient/123`

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{FhirError, Result};
use crate::fhir::ResourceType;

/// A parsed reference. Only the id segment is guaranteed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceReference {
    pub resource_type: Option<ResourceType>,
    pub id: String,
    pub version: Option<String>,
}

impl ResourceReference {
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type),
            id: id.into(),
            version: None,
        }
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.resource_type, &self.version) {
            (Some(rt), Some(v)) => write!(f, "{rt}/{}/_history/{v}", self.id),
            (Some(rt), None) => write!(f, "{rt}/{}", self.id),
            (None, _) => f.write_str(&self.id),
        }
    }
}

/// Parse a reference string.
///
/// Unknown type segments are rejected with `InvalidArgument`; contained
/// (`#id`) and URN references cannot be resolved and are rejected as well.
pub fn parse_reference(reference: &str) -> Result<ResourceReference> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(FhirError::invalid_argument("empty reference"));
    }
    if reference.starts_with('#') || reference.starts_with("urn:") {
        return Err(FhirError::invalid_argument(format!(
            "reference cannot be resolved: {reference}"
        )));
    }

    let segments: Vec<String> = if reference.contains("://") {
        let url = Url::parse(reference)
            .map_err(|e| FhirError::invalid_argument(format!("invalid reference URL: {e}")))?;
        url.path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    } else {
        reference
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };

    // Trailing `_history/{vid}` is peeled off first.
    let (path, version) = match segments.as_slice() {
        [head @ .., marker, vid] if marker == "_history" && head.len() >= 2 => {
            (head.to_vec(), Some(vid.clone()))
        }
        _ => (segments.clone(), None),
    };

    match path.as_slice() {
        [id] => Ok(ResourceReference {
            resource_type: None,
            id: id.clone(),
            version,
        }),
        [.., rt, id] => Ok(ResourceReference {
            resource_type: Some(ResourceType::from_str(rt)?),
            id: id.clone(),
            version,
        }),
        [] => Err(FhirError::invalid_argument(format!(
            "reference has no id segment: {reference}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_id() {
        let r = parse_reference("123").unwrap();
        assert_eq!(r.id, "123");
        assert_eq!(r.resource_type, None);
    }

    #[test]
    fn test_relative_reference() {
        let r = parse_reference("Patient/123").unwrap();
        assert_eq!(r.resource_type, Some(ResourceType::Patient));
        assert_eq!(r.id, "123");
        assert_eq!(r.to_string(), "Patient/123");
    }

    #[test]
    fn test_versioned_reference() {
        let r = parse_reference("Patient/123/_history/2").unwrap();
        assert_eq!(r.id, "123");
        assert_eq!(r.version.as_deref(), Some("2"));
    }

    #[test]
    fn test_absolute_reference() {
        let r = parse_reference("http://example.org/fhir/Observation/o-9").unwrap();
        assert_eq!(r.resource_type, Some(ResourceType::Observation));
        assert_eq!(r.id, "o-9");
    }

    #[test]
    fn test_unresolvable_references() {
        assert!(parse_reference("#contained").is_err());
        assert!(parse_reference("urn:uuid:abc").is_err());
        assert!(parse_reference("Spaceship/1").is_err());
        assert!(parse_reference("  ").is_err());
    }
}
