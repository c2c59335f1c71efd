pub mod context;
pub mod error;
pub mod fhir;
pub mod id;
pub mod reference;
pub mod time;

pub use context::{Identity, RequestContext};
pub use error::{ErrorKind, FhirError, Result};
pub use fhir::{ResourceType, is_valid_resource_type_name};
pub use id::{KeyFormat, generate_id, parse_native_key, parse_version_id, validate_id};
pub use reference::{ResourceReference, parse_reference};
pub use time::{FhirDateTime, now_utc};
