use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use clinbridge_core::{ErrorKind, FhirError};
use serde::Serialize;

/// Minimal OperationOutcome representation for error responses
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationOutcome {
    #[serde(rename = "resourceType")]
    pub resource_type: &'static str, // always "OperationOutcome"
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationOutcomeIssue {
    /// Issue severity: fatal | error | warning | information
    pub severity: &'static str,
    /// Issue type code: invalid | not-found | deleted | conflict | not-supported | exception
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl OperationOutcome {
    pub fn single(severity: &'static str, code: &'static str, diagnostics: impl Into<String>) -> Self {
        Self {
            resource_type: "OperationOutcome",
            issue: vec![OperationOutcomeIssue {
                severity,
                code,
                diagnostics: Some(diagnostics.into()),
            }],
        }
    }
}

/// Transport-facing wrapper around [`FhirError`].
#[derive(Debug, Clone, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub FhirError);

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::NotSupported => StatusCode::NOT_IMPLEMENTED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Gone => StatusCode::GONE,
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Conflict | ErrorKind::AmbiguousReference => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn issue_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidArgument | ErrorKind::Validation => "invalid",
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Gone => "deleted",
            ErrorKind::Conflict | ErrorKind::AmbiguousReference => "conflict",
            ErrorKind::Internal => "exception",
        }
    }

    pub fn to_operation_outcome(&self) -> OperationOutcome {
        let severity = if self.0.is_server_error() { "fatal" } else { "error" };
        OperationOutcome::single(severity, self.issue_code(), self.0.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::to_vec(&self.to_operation_outcome()).unwrap_or_else(|_| {
            let fallback = OperationOutcome::single("fatal", "exception", "Serialization failure");
            serde_json::to_vec(&fallback).unwrap_or_else(|_| b"{}".to_vec())
        });

        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/fhir+json"),
        );
        response
    }
}
