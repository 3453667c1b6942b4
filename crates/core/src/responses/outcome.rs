//! OperationOutcome generation.
//!
//! The structured error payload shape returned on failure, carrying one or
//! more `issue` entries with a `code`.

use serde_json::Value;

/// Issue severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Processing has failed.
    Error,
    /// Processing succeeded but with concerns.
    Warning,
    /// Informational message.
    Information,
}

impl IssueSeverity {
    /// The FHIR string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Information => "information",
        }
    }
}

/// Issue codes used by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    /// Invalid content (malformed path, body, or field).
    Invalid,
    /// Resource not found.
    NotFound,
    /// Conflict with existing state.
    Conflict,
    /// Processing error.
    Processing,
    /// Informational message.
    Informational,
}

impl IssueType {
    /// The FHIR code string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Invalid => "invalid",
            IssueType::NotFound => "not-found",
            IssueType::Conflict => "conflict",
            IssueType::Processing => "processing",
            IssueType::Informational => "informational",
        }
    }
}

/// Builds an OperationOutcome with a single issue.
pub fn outcome(severity: IssueSeverity, code: IssueType, details: &str) -> Value {
    serde_json::json!({
        "resourceType": "OperationOutcome",
        "issue": [{
            "severity": severity.as_str(),
            "code": code.as_str(),
            "details": { "text": details }
        }]
    })
}

/// Builds a single-issue error OperationOutcome.
pub fn error_outcome(code: IssueType, details: &str) -> Value {
    outcome(IssueSeverity::Error, code, details)
}
