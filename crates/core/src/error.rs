//! Error types for the resource server.
//!
//! Every layer below the dispatcher raises the most specific [`ServerError`]
//! at the point of detection; the dispatcher is the single place that turns
//! an error into a rendered OperationOutcome response.

use thiserror::Error;

use crate::responses::outcome::IssueType;

/// The primary error type for all store, search, and dispatch operations.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed path, malformed JSON body, or missing required field.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unknown resource, or the current version is a tombstone.
    #[error("resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    /// Version mismatch on a conditional update.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage adapter I/O failure or internal invariant violation.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ServerError {
    /// Shorthand for a [`ServerError::NotFound`].
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        ServerError::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// The HTTP status this error renders as.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::NotFound { .. } => 404,
            ServerError::Conflict(_) => 409,
            ServerError::Storage(_) => 500,
        }
    }

    /// The OperationOutcome issue code this error renders as.
    pub fn issue_type(&self) -> IssueType {
        match self {
            ServerError::BadRequest(_) => IssueType::Invalid,
            ServerError::NotFound { .. } => IssueType::NotFound,
            ServerError::Conflict(_) => IssueType::Conflict,
            ServerError::Storage(_) => IssueType::Processing,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for ServerError {
    fn from(err: rusqlite::Error) -> Self {
        ServerError::Storage(err.to_string())
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::not_found("Patient", "123");
        assert_eq!(err.to_string(), "resource not found: Patient/123");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServerError::BadRequest("x".into()).status(), 400);
        assert_eq!(ServerError::not_found("Patient", "1").status(), 404);
        assert_eq!(ServerError::Conflict("x".into()).status(), 409);
        assert_eq!(ServerError::Storage("x".into()).status(), 500);
    }

    #[test]
    fn test_issue_type_mapping() {
        assert_eq!(
            ServerError::not_found("Patient", "1").issue_type().as_str(),
            "not-found"
        );
        assert_eq!(
            ServerError::BadRequest("x".into()).issue_type().as_str(),
            "invalid"
        );
        assert_eq!(
            ServerError::Storage("x".into()).issue_type().as_str(),
            "processing"
        );
    }
}
