use thiserror::Error;

use crate::time::FhirDateTime;

/// Errors raised anywhere along the interaction pipeline.
///
/// Every variant maps to exactly one [`ErrorKind`]; the transport boundary
/// only needs the kind and the diagnostic text to build a response.
#[derive(Debug, Clone, Error)]
pub enum FhirError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    #[error("Resource deleted: {resource_type}/{id} (deleted at {deleted_at})")]
    Gone {
        resource_type: String,
        id: String,
        deleted_at: FhirDateTime,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Handler already registered for resource type {0}")]
    DuplicateRegistration(String),

    #[error("Ambiguous reference: {0}")]
    AmbiguousReference(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FhirError {
    /// Create a new InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a new NotSupported error
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    /// Create a new NotFound error
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Create a new Gone error for a logically deleted record
    pub fn gone(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        deleted_at: FhirDateTime,
    ) -> Self {
        Self::Gone {
            resource_type: resource_type.into(),
            id: id.into(),
            deleted_at,
        }
    }

    /// Create a new Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a new DuplicateRegistration error
    pub fn duplicate_registration(resource_type: impl Into<String>) -> Self {
        Self::DuplicateRegistration(resource_type.into())
    }

    /// Create a new AmbiguousReference error
    pub fn ambiguous_reference(message: impl Into<String>) -> Self {
        Self::AmbiguousReference(message.into())
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotSupported(_) => ErrorKind::NotSupported,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Gone { .. } => ErrorKind::Gone,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) | Self::DuplicateRegistration(_) => ErrorKind::Conflict,
            Self::AmbiguousReference(_) => ErrorKind::AmbiguousReference,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Free-text diagnostic for the error.
    pub fn diagnostics(&self) -> String {
        self.to_string()
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Check if this error is a server error (5xx category)
    pub fn is_server_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Internal | ErrorKind::NotSupported)
    }
}

impl From<serde_json::Error> for FhirError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Error taxonomy shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotSupported,
    NotFound,
    Gone,
    Validation,
    Conflict,
    AmbiguousReference,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid_argument"),
            Self::NotSupported => write!(f, "not_supported"),
            Self::NotFound => write!(f, "not_found"),
            Self::Gone => write!(f, "gone"),
            Self::Validation => write!(f, "validation"),
            Self::Conflict => write!(f, "conflict"),
            Self::AmbiguousReference => write!(f, "ambiguous_reference"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Convenience result type for pipeline operations
pub type Result<T> = std::result::Result<T, FhirError>;
