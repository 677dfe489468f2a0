//! Gate definitions and evaluation results
//!
//! A gate is a named precondition that must be explicitly satisfied before
//! a privileged operation proceeds. The evaluator checks every gate in a
//! workflow's required list so a single response reports every deficiency.

use crate::ids::GateId;
use serde::{Deserialize, Serialize};

/// The gate kinds the evaluator understands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// Checkbox plus a caller-typed phrase that must byte-equal the
    /// configured literal (case-sensitive, no trimming)
    OwnershipAttestation,
    /// Caller asserts a prior out-of-band trust event occurred; the gate
    /// checks the claim, it does not perform authorization
    DeviceAuthorization,
    /// Caller-typed phrase compared case-insensitively against the
    /// configured phrase, with no trimming of surrounding whitespace
    DestructiveConfirmation,
    /// The action's declared tool id must exist in the capability catalog
    ToolAllowlist,
    /// Case-insensitive substring scan of free-text fields against the
    /// banned-keyword list
    NoCircumvention,
}

/// A gate as declared in the catalog document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateSpec {
    pub id: GateId,
    pub kind: GateKind,
}

/// Outcome of one gate check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateCheck {
    pub gate: GateId,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Phrase the caller must type, reported when a confirmation gate fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_phrase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl GateCheck {
    pub fn passed(gate: GateId) -> Self {
        Self {
            gate,
            passed: true,
            detail: None,
            required_phrase: None,
            warning: None,
        }
    }

    pub fn failed(gate: GateId, detail: impl Into<String>) -> Self {
        Self {
            gate,
            passed: false,
            detail: Some(detail.into()),
            required_phrase: None,
            warning: None,
        }
    }

    pub fn with_required_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.required_phrase = Some(phrase.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Combined result of evaluating a required-gate list.
///
/// `all_passed` is true iff every individual gate passed; a partial pass is
/// never success.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateReport {
    pub all_passed: bool,
    pub results: Vec<GateCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

impl GateReport {
    pub fn from_checks(results: Vec<GateCheck>) -> Self {
        let failed: Vec<&GateCheck> = results.iter().filter(|c| !c.passed).collect();
        let all_passed = failed.is_empty();
        let blocked_reason = if all_passed {
            None
        } else {
            Some(format!(
                "{} of {} required gates unsatisfied: {}",
                failed.len(),
                results.len(),
                failed
                    .iter()
                    .map(|c| c.gate.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        };
        Self {
            all_passed,
            results,
            blocked_reason,
        }
    }

    /// Checks that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &GateCheck> {
        self.results.iter().filter(|c| !c.passed)
    }
}
