//! Resource ids and their native key forms.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FhirError, Result};

/// Maximum length of a logical id.
pub const MAX_ID_LENGTH: usize = 64;

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-\.]{1,64}$").expect("Invalid id regex"));

/// Validates a logical id against the `[A-Za-z0-9\-.]{1,64}` grammar.
pub fn validate_id(id: &str) -> Result<()> {
    if ID_REGEX.is_match(id) {
        Ok(())
    } else {
        Err(FhirError::invalid_argument(format!("Invalid resource id '{id}'")))
    }
}

/// The key shape the repository uses for a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// Native keys are UUIDs; ids are normalised to lowercase hyphenated form.
    #[default]
    Uuid,
    /// Native keys are plain logical ids.
    Id,
}

/// Parses an external id into the native key form for `format`.
pub fn parse_native_key(id: &str, format: KeyFormat) -> Result<String> {
    match format {
        KeyFormat::Uuid => Uuid::parse_str(id)
            .map(|uuid| uuid.hyphenated().to_string())
            .map_err(|e| FhirError::invalid_argument(format!("Invalid resource id '{id}': {e}"))),
        KeyFormat::Id => {
            validate_id(id)?;
            Ok(id.to_string())
        }
    }
}

/// Version ids are opaque but must still be a valid id token.
pub fn parse_version_id(version: &str) -> Result<String> {
    validate_id(version)
        .map(|_| version.to_string())
        .map_err(|_| FhirError::invalid_argument(format!("Invalid version id '{version}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_uuid() {
        let id = generate_id();
        assert!(Uuid::parse_str(&id).is_ok());
        assert!(validate_id(&id).is_ok());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("abc-123.x").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("has space").is_err());
        assert!(validate_id(&"a".repeat(MAX_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_parse_native_key_uuid() {
        let key = parse_native_key("A1B2C3D4-0000-4000-8000-000000000001", KeyFormat::Uuid).unwrap();
        assert_eq!(key, "a1b2c3d4-0000-4000-8000-000000000001");
        assert!(parse_native_key("not-a-uuid", KeyFormat::Uuid).is_err());
    }

    #[test]
    fn test_parse_native_key_id() {
        assert_eq!(parse_native_key("pat-1", KeyFormat::Id).unwrap(), "pat-1");
        assert!(parse_native_key("pat/1", KeyFormat::Id).is_err());
    }

    #[test]
    fn test_parse_version_id() {
        assert_eq!(parse_version_id("3").unwrap(), "3");
        assert!(parse_version_id("3 4").is_err());
    }
}
