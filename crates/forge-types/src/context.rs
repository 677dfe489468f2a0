//! Execution context: who is asking, for which device, with which consents
//!
//! One `ExecutionContext` exists for exactly one workflow run. It carries
//! the caller's identity and the explicit confirmations the gate evaluator
//! checks; it never carries credentials.

use crate::capability::Role;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Explicit, caller-supplied consent artifacts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfirmationSet {
    /// Ownership attestation checkbox state
    #[serde(default)]
    pub ownership_acknowledged: bool,
    /// Caller-typed ownership phrase, compared exactly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_phrase: Option<String>,
    /// Caller's claim that an out-of-band device trust event occurred
    #[serde(default)]
    pub device_authorized: bool,
    /// Caller-typed destructive confirmation phrase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destructive_phrase: Option<String>,
}

/// Context for one workflow run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Ticket / repair case this operation belongs to
    pub case_id: String,
    /// Technician performing the operation
    pub user_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_serial: Option<String>,
    #[serde(default)]
    pub confirmations: ConfirmationSet,
    /// Free-text fields (notes, reasons) scanned by the no_circumvention gate
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, String>,
    /// Inputs for prompt steps, keyed by prompt name; may be supplied up
    /// front or delivered while the run is waiting_for_user
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub prompt_inputs: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn new(case_id: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            case_id: case_id.into(),
            user_id: user_id.into(),
            role,
            device_serial: None,
            confirmations: ConfirmationSet::default(),
            fields: HashMap::new(),
            prompt_inputs: HashMap::new(),
        }
    }

    pub fn with_device(mut self, serial: impl Into<String>) -> Self {
        self.device_serial = Some(serial.into());
        self
    }

    pub fn with_confirmations(mut self, confirmations: ConfirmationSet) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_prompt_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.prompt_inputs.insert(key.into(), value.into());
        self
    }
}
