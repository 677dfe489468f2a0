//! BootForge policy engine
//!
//! Maps (role, capability) onto allow, allow-with-requirements, or deny.
//! Rules are evaluated in declaration order; a rule applies only when every
//! condition it specifies matches, omitted conditions act as wildcards, and
//! the first applicable rule wins. When nothing matches the configured
//! default applies, which is deny unless a deployment overrides it.

#![deny(unsafe_code)]

use forge_types::{CapabilitySpec, PolicyDecision, PolicyDefault, PolicyRule, Role, RuleOutcome};
use tracing::debug;

pub struct PolicyEngine {
    rules: Vec<PolicyRule>,
    default: PolicyDefault,
}

impl PolicyEngine {
    pub fn new(rules: Vec<PolicyRule>, default: PolicyDefault) -> Self {
        Self { rules, default }
    }

    /// Decide whether `role` may run `capability`.
    ///
    /// The capability's own `allowed_roles` list is checked first; a role
    /// the capability never admits is denied before any rule is consulted.
    pub fn evaluate(&self, role: Role, capability: &CapabilitySpec) -> PolicyDecision {
        if !capability.allows_role(role) {
            debug!(
                capability = %capability.id,
                %role,
                "role not in capability allowlist"
            );
            return PolicyDecision::denied(format!(
                "role {} is not allowed to run {}",
                role, capability.id
            ));
        }

        for rule in &self.rules {
            if !rule_applies(rule, role, capability) {
                continue;
            }
            debug!(
                capability = %capability.id,
                %role,
                rule = %rule.id,
                outcome = ?rule.outcome,
                "policy rule matched"
            );
            return match rule.outcome {
                RuleOutcome::Allow => PolicyDecision {
                    allowed: true,
                    matched_rule: Some(rule.id.clone()),
                    requirements: Vec::new(),
                    reason: rule
                        .reason
                        .clone()
                        .unwrap_or_else(|| format!("allowed by rule {}", rule.id)),
                },
                RuleOutcome::AllowWithRequirements => PolicyDecision {
                    allowed: true,
                    matched_rule: Some(rule.id.clone()),
                    requirements: rule.requirements.clone(),
                    reason: rule
                        .reason
                        .clone()
                        .unwrap_or_else(|| format!("allowed with requirements by rule {}", rule.id)),
                },
                RuleOutcome::Deny => PolicyDecision {
                    allowed: false,
                    matched_rule: Some(rule.id.clone()),
                    requirements: Vec::new(),
                    reason: rule
                        .reason
                        .clone()
                        .unwrap_or_else(|| format!("denied by rule {}", rule.id)),
                },
            };
        }

        match self.default {
            PolicyDefault::Deny => {
                debug!(capability = %capability.id, %role, "no rule matched, default deny");
                PolicyDecision::denied("no policy rule matched; default is deny")
            }
            PolicyDefault::Allow => PolicyDecision {
                allowed: true,
                matched_rule: None,
                requirements: Vec::new(),
                reason: "no policy rule matched; default is allow".to_string(),
            },
        }
    }
}

fn rule_applies(rule: &PolicyRule, role: Role, capability: &CapabilitySpec) -> bool {
    if let Some(categories) = &rule.categories {
        if !categories.contains(&capability.category) {
            return false;
        }
    }
    if let Some(roles) = &rule.roles {
        if !roles.contains(&role) {
            return false;
        }
    }
    if let Some(risk_levels) = &rule.risk_levels {
        if !risk_levels.contains(&capability.risk) {
            return false;
        }
    }
    true
}
