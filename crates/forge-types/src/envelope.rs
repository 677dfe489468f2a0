//! Uniform response envelope
//!
//! Every core-facing operation returns an `Envelope`: `ok` plus either
//! `data` or a coded `error`, never both, alongside operation identity and
//! timing metadata. Simulation responses reuse the same shape with
//! `would_succeed` and per-check detail in `data`.

use crate::error::{CoreError, ReasonCode};
use crate::ids::{CorrelationId, OperationId};
use crate::workflow::WorkflowState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and terminal status of the operation being reported.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationInfo {
    pub id: OperationId,
    pub status: WorkflowState,
}

/// Coded error payload; `details` carries structured context such as the
/// failing gate checks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: ReasonCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration of the call in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
}

impl Default for EnvelopeMetadata {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            duration_ms: None,
            capability: None,
        }
    }
}

/// The response wrapper returned by execute, simulate, and every denial.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    pub operation: OperationInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    pub metadata: EnvelopeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl Envelope {
    pub fn success(operation_id: OperationId, data: serde_json::Value) -> Self {
        Self {
            ok: true,
            operation: OperationInfo {
                id: operation_id,
                status: WorkflowState::Completed,
            },
            data: Some(data),
            error: None,
            metadata: EnvelopeMetadata::default(),
            correlation_id: None,
        }
    }

    pub fn failure(operation_id: OperationId, status: WorkflowState, error: &CoreError) -> Self {
        Self {
            ok: false,
            operation: OperationInfo {
                id: operation_id,
                status,
            },
            data: None,
            error: Some(EnvelopeError {
                code: error.code(),
                message: error.to_string(),
                details: serde_json::Value::Null,
            }),
            metadata: EnvelopeMetadata::default(),
            correlation_id: None,
        }
    }

    pub fn with_error_details(mut self, details: serde_json::Value) -> Self {
        if let Some(err) = self.error.as_mut() {
            err.details = details;
        }
        self
    }

    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.metadata.capability = Some(capability.into());
        self
    }

    pub fn with_duration_ms(mut self, millis: u64) -> Self {
        self.metadata.duration_ms = Some(millis);
        self
    }
}

/// One check performed during a simulation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationCheck {
    /// What was checked, e.g. "policy" or a gate id
    pub check: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SimulationCheck {
    pub fn new(check: impl Into<String>, passed: bool) -> Self {
        Self {
            check: check.into(),
            passed,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
