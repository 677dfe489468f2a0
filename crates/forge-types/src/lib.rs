//! BootForge shared data model
//!
//! Every crate in the workspace speaks these types: capability and tool
//! specs, policy rules, gate definitions, workflow definitions and runtime
//! state, audit events, the response envelope, and the error taxonomy.
//! This crate holds data only; evaluation and orchestration live in the
//! engine crates.

#![deny(unsafe_code)]

pub mod audit;
pub mod capability;
pub mod context;
pub mod envelope;
pub mod error;
pub mod gate;
pub mod ids;
pub mod policy;
pub mod workflow;

pub use audit::{AuditEvent, AuditEventId, AuditStage};
pub use capability::{ActionCategory, CapabilitySpec, RiskLevel, Role, ToolKind, ToolSpec};
pub use context::{ConfirmationSet, ExecutionContext};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMetadata, OperationInfo, SimulationCheck};
pub use error::{CoreError, ReasonCode};
pub use gate::{GateCheck, GateKind, GateReport, GateSpec};
pub use ids::{CapabilityId, ClientId, CorrelationId, GateId, OperationId, ToolId, WorkflowId};
pub use policy::{PolicyDecision, PolicyDefault, PolicyRule, Requirement, RuleOutcome};
pub use workflow::{
    FailurePolicy, StepKind, StepRecord, StepStatus, Workflow, WorkflowState, WorkflowStep,
};
