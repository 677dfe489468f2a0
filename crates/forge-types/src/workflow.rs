//! Workflow definitions and runtime state
//!
//! A workflow is an ordered list of steps executed strictly sequentially
//! under a single admission slot. Step failure is resolved by the step's
//! `on_failure` policy: abort, retry with bounded attempts, or continue.

use crate::ids::{CapabilityId, GateId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a step does when it runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StepKind {
    /// Invoke the tool adapter for a capability
    Invoke {
        capability: CapabilityId,
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Suspend for a fixed duration (scheduled continuation, no thread held)
    Wait {
        #[serde(with = "duration_millis")]
        duration: Duration,
    },
    /// Suspend indefinitely until the caller supplies the named input
    Prompt { key: String, message: String },
}

/// What to do when a step fails.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum FailurePolicy {
    /// Halt the workflow; remaining steps are marked skipped
    Abort,
    /// Record the failure and proceed to the next step
    Continue,
    /// Re-attempt up to `attempts` extra times, optionally delayed
    Retry {
        attempts: u32,
        #[serde(
            default,
            with = "opt_duration_millis",
            skip_serializing_if = "Option::is_none"
        )]
        delay: Option<Duration>,
    },
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Abort
    }
}

/// One step of a workflow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Per-attempt ceiling for Invoke steps; shortened in degraded mode
    #[serde(
        default,
        with = "opt_duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl WorkflowStep {
    pub fn invoke(id: impl Into<String>, capability: CapabilityId) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: StepKind::Invoke {
                capability,
                params: serde_json::Value::Null,
            },
            on_failure: FailurePolicy::default(),
            timeout: None,
        }
    }

    pub fn wait(id: impl Into<String>, duration: Duration) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: StepKind::Wait { duration },
            on_failure: FailurePolicy::default(),
            timeout: None,
        }
    }

    pub fn prompt(id: impl Into<String>, key: impl Into<String>, message: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: StepKind::Prompt {
                key: key.into(),
                message: message.into(),
            },
            on_failure: FailurePolicy::default(),
            timeout: None,
        }
    }

    pub fn with_on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A workflow definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    /// Capability this workflow performs; resolved against the catalog
    pub capability: CapabilityId,
    /// Gates that must all pass before the first step runs
    #[serde(default)]
    pub required_gates: Vec<GateId>,
    pub steps: Vec<WorkflowStep>,
}

/// Per-step runtime status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Workflow runtime state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    /// A prompt step's input has not arrived; suspended indefinitely
    WaitingForUser,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }
}

/// Runtime record for one step of one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    pub status: StepStatus,
    /// Total execution attempts (1 + retries actually performed)
    pub attempts: u32,
    /// Retries performed beyond the first attempt
    pub retried_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    pub fn pending(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            attempts: 0,
            retried_attempts: 0,
            error: None,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

mod opt_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(d)?;
        Ok(ms.map(Duration::from_millis))
    }
}
