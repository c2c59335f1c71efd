//! `_include` and `_revinclude` directives.
//!
//! - `_include=Observation:subject` embeds the resources the results point to
//! - `_revinclude=Observation:subject` embeds resources pointing at the results
//! - `:iterate` is accepted but not followed

use std::str::FromStr;

use clinbridge_core::{FhirError, ResourceType, Result};
use tracing::debug;

use crate::parameter_map::ParameterMap;
use crate::parameters::SearchParameterType;

/// A resolved join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeInstruction {
    /// Kind owning the reference field.
    pub kind: ResourceType,
    /// Search parameter named in the directive.
    pub param: String,
    /// Native path of the reference field.
    pub join_path: String,
    /// Kind the reference points at, when known.
    pub target: Option<ResourceType>,
    pub reverse: bool,
    pub iterate: bool,
}

/// Check if a parameter name is an include parameter.
pub fn is_include_parameter(name: &str) -> bool {
    name == "_include" || name == "_include:iterate"
}

/// Check if a parameter name is a revinclude parameter.
pub fn is_revinclude_parameter(name: &str) -> bool {
    name == "_revinclude" || name == "_revinclude:iterate"
}

/// Parse one directive value, `Type:param[:TargetType]`.
///
/// Returns `Ok(None)` when the parameter is not a known reference parameter
/// of `Type`; such directives are dropped like unknown search parameters.
///
/// # Errors
///
/// Returns `FhirError::InvalidArgument` for malformed values or unknown kinds.
pub fn parse_include(
    value: &str,
    reverse: bool,
    iterate: bool,
    map: &ParameterMap,
) -> Result<Option<IncludeInstruction>> {
    let mut parts = value.split(':');
    let (Some(kind), Some(param)) = (parts.next(), parts.next()) else {
        return Err(FhirError::invalid_argument(format!(
            "include must have the form Type:param, got '{value}'"
        )));
    };
    let explicit_target = parts.next().map(ResourceType::from_str).transpose()?;
    if parts.next().is_some() || param.is_empty() {
        return Err(FhirError::invalid_argument(format!("malformed include '{value}'")));
    }
    let kind = ResourceType::from_str(kind)?;

    let Some(mapping) = map.resolve(kind, param) else {
        debug!(kind = %kind, param = %param, "Dropping include on unmapped parameter");
        return Ok(None);
    };
    if mapping.kind != SearchParameterType::Reference {
        debug!(kind = %kind, param = %param, "Dropping include on non-reference parameter");
        return Ok(None);
    }

    Ok(Some(IncludeInstruction {
        kind,
        param: param.to_string(),
        join_path: mapping.path.clone(),
        target: explicit_target.or(mapping.target),
        reverse,
        iterate,
    }))
}
