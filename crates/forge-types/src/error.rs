//! Error taxonomy shared across the workspace
//!
//! Engine crates carry their own error enums; the executor folds them into
//! `CoreError` so every user-visible response carries exactly one
//! machine-readable reason code and never leaks secret material.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable reason codes surfaced in envelopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    ValidationError,
    UnknownCapability,
    PolicyDenied,
    GateFailed,
    ResourceExhausted,
    ToolExecutionError,
    IntegrityError,
    SessionError,
    Cancelled,
    Internal,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::ValidationError => "VALIDATION_ERROR",
            ReasonCode::UnknownCapability => "UNKNOWN_CAPABILITY",
            ReasonCode::PolicyDenied => "POLICY_DENIED",
            ReasonCode::GateFailed => "GATE_FAILED",
            ReasonCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ReasonCode::ToolExecutionError => "TOOL_EXECUTION_ERROR",
            ReasonCode::IntegrityError => "INTEGRITY_ERROR",
            ReasonCode::SessionError => "SESSION_ERROR",
            ReasonCode::Cancelled => "CANCELLED",
            ReasonCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Top-level error for core-facing operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input, rejected before any gate runs
    #[error("validation failed: {0}")]
    Validation(String),

    /// No catalog entry for the requested operation; fails closed
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    /// Role/risk mismatch; never retried
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// One or more required gates unsatisfied; never auto-bypassed
    #[error("gates unsatisfied: {0}")]
    GateFailed(String),

    /// Admission backlog full; caller should back off
    #[error("admission rejected: {0}")]
    ResourceExhausted(String),

    /// Adapter failure after step policy was exhausted
    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    /// Shadow-log decrypt/tag mismatch
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Expired/invalid/locked-out session; requires re-authentication
    #[error("session error: {0}")]
    Session(String),

    /// Workflow cancelled between steps
    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn code(&self) -> ReasonCode {
        match self {
            CoreError::Validation(_) => ReasonCode::ValidationError,
            CoreError::UnknownCapability(_) => ReasonCode::UnknownCapability,
            CoreError::PolicyDenied(_) => ReasonCode::PolicyDenied,
            CoreError::GateFailed(_) => ReasonCode::GateFailed,
            CoreError::ResourceExhausted(_) => ReasonCode::ResourceExhausted,
            CoreError::ToolExecution(_) => ReasonCode::ToolExecutionError,
            CoreError::Integrity(_) => ReasonCode::IntegrityError,
            CoreError::Session(_) => ReasonCode::SessionError,
            CoreError::Cancelled => ReasonCode::Cancelled,
            CoreError::Internal(_) => ReasonCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(ReasonCode::GateFailed.as_str(), "GATE_FAILED");
        assert_eq!(
            CoreError::UnknownCapability("x".into()).code(),
            ReasonCode::UnknownCapability
        );
    }

    #[test]
    fn reason_code_serializes_screaming() {
        let json = serde_json::to_string(&ReasonCode::ResourceExhausted).unwrap();
        assert_eq!(json, "\"RESOURCE_EXHAUSTED\"");
    }
}
