//! Policy rule data model
//!
//! Rules are declared in the catalog document and evaluated in declaration
//! order by the policy engine. A rule applies only when every condition it
//! specifies matches; omitted conditions act as wildcards.

use crate::capability::{ActionCategory, RiskLevel, Role};
use serde::{Deserialize, Serialize};

/// What a matching rule decides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Allow,
    AllowWithRequirements,
    Deny,
}

/// A requirement attached by an `allow_with_requirements` rule.
///
/// The executor must satisfy every attached requirement before commit;
/// requirements are surfaced verbatim in deny/conditional responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Requirement {
    /// A second technician must co-sign the operation record
    Cosign,
    /// Customer-signed intake form must be on file for the case
    IntakeFormOnFile,
    /// Operation must run under supervisor observation
    SupervisorPresent,
    /// Free-form requirement carried through from the catalog document
    Note { text: String },
}

/// A single authorization rule.
///
/// `None` conditions are wildcards. The first rule whose conditions all
/// match wins; later rules are not consulted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<ActionCategory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Role>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_levels: Option<Vec<RiskLevel>>,
    pub outcome: RuleOutcome,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Behavior when no rule matches a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDefault {
    #[default]
    Deny,
    Allow,
}

/// Result of evaluating the rule set for one (role, capability) request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    /// Id of the first matching rule, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    /// Requirements the executor must satisfy before commit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
    pub reason: String,
}

impl PolicyDecision {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            matched_rule: None,
            requirements: Vec::new(),
            reason: reason.into(),
        }
    }
}
