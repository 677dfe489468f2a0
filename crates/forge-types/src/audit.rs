//! Audit events
//!
//! One event is created per lifecycle transition and never revisited.
//! The same shape is written to both channels; the shadow channel stores
//! it encrypted with a per-entry content hash.

use crate::capability::Role;
use crate::ids::{CapabilityId, OperationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an audit event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEventId(pub String);

impl AuditEventId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for AuditEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which lifecycle transition an event records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    OperationStarted,
    PolicyEvaluated,
    GatesEvaluated,
    StepStarted,
    StepCompleted,
    StepFailed,
    /// A retry re-attempt is about to run (one per re-attempt)
    StepRetried,
    StepSkipped,
    PromptRequested,
    PromptAnswered,
    OperationCompleted,
    OperationFailed,
    OperationCancelled,
    /// Stuck slot reclaimed by the admission sweep, not a normal release
    SlotForceReleased,
    SessionCreated,
    SessionRevoked,
    ClientLockedOut,
    CatalogReloaded,
}

/// A single append-only audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub timestamp: DateTime<Utc>,
    pub stage: AuditStage,
    pub operation_id: OperationId,
    pub case_id: String,
    pub actor: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<CapabilityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Structured detail; secret-bearing keys are redacted before write
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        stage: AuditStage,
        operation_id: OperationId,
        case_id: impl Into<String>,
        actor: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: AuditEventId::generate(),
            timestamp: Utc::now(),
            stage,
            operation_id,
            case_id: case_id.into(),
            actor: actor.into(),
            role,
            capability: None,
            step_id: None,
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_capability(mut self, capability: CapabilityId) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}
