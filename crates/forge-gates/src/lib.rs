//! BootForge gate evaluator
//!
//! Gates are explicit preconditions checked immediately before a privileged
//! operation is admitted. Every gate in the required list is evaluated, so
//! a single response reports every deficiency instead of stopping at the
//! first one. A partial pass is never success.

#![deny(unsafe_code)]

use forge_catalog::CatalogSnapshot;
use forge_types::{
    CapabilityId, ExecutionContext, GateCheck, GateId, GateKind, GateReport, ToolId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// What to do when a required gate id is not declared in the catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownGatePolicy {
    /// Treat the unknown gate as failed
    #[default]
    FailClosed,
    /// Record a warning check that passes
    WarnAndPass,
}

/// Site configuration for the gate evaluator: confirmation phrase literals
/// and the banned-keyword list for the circumvention scan.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateManifest {
    /// Literal the caller must type for ownership attestation, compared
    /// byte-for-byte
    pub ownership_phrase: String,
    /// Literal for destructive confirmation, compared ASCII
    /// case-insensitively with no trimming
    pub destructive_phrase: String,
    /// Substrings that fail the no_circumvention scan, matched
    /// case-insensitively
    pub banned_keywords: Vec<String>,
    #[serde(default)]
    pub unknown_gate_policy: UnknownGatePolicy,
}

impl Default for GateManifest {
    fn default() -> Self {
        Self {
            ownership_phrase: "I confirm the customer owns this device".to_string(),
            destructive_phrase: "ERASE_AND_RESTORE".to_string(),
            banned_keywords: vec![
                "stolen".to_string(),
                "icloud locked".to_string(),
                "find my".to_string(),
                "not my phone".to_string(),
                "found device".to_string(),
            ],
            unknown_gate_policy: UnknownGatePolicy::default(),
        }
    }
}

/// The operation the gates are judging.
#[derive(Clone, Debug)]
pub struct GateSubject {
    pub capability: CapabilityId,
    /// Tool the adapter would invoke, checked by tool_allowlist
    pub tool: ToolId,
}

pub struct GateEvaluator {
    snapshot: Arc<CatalogSnapshot>,
    manifest: GateManifest,
}

impl GateEvaluator {
    pub fn new(snapshot: Arc<CatalogSnapshot>, manifest: GateManifest) -> Self {
        Self { snapshot, manifest }
    }

    /// Evaluate every gate in `required`; never short-circuits.
    pub fn evaluate(
        &self,
        required: &[GateId],
        subject: &GateSubject,
        ctx: &ExecutionContext,
    ) -> GateReport {
        let results = required
            .iter()
            .map(|id| self.check_one(id, subject, ctx))
            .collect();
        GateReport::from_checks(results)
    }

    fn check_one(&self, id: &GateId, subject: &GateSubject, ctx: &ExecutionContext) -> GateCheck {
        let Some(spec) = self.snapshot.gate(id) else {
            return self.unknown_gate(id, subject);
        };
        match spec.kind {
            GateKind::OwnershipAttestation => self.ownership_attestation(id, ctx),
            GateKind::DeviceAuthorization => device_authorization(id, ctx),
            GateKind::DestructiveConfirmation => self.destructive_confirmation(id, ctx),
            GateKind::ToolAllowlist => self.tool_allowlist(id, subject),
            GateKind::NoCircumvention => self.no_circumvention(id, ctx),
        }
    }

    fn unknown_gate(&self, id: &GateId, subject: &GateSubject) -> GateCheck {
        match self.manifest.unknown_gate_policy {
            UnknownGatePolicy::FailClosed => {
                warn!(gate = %id, capability = %subject.capability, "unknown gate id, failing closed");
                GateCheck::failed(id.clone(), "gate is not declared in the catalog")
                    .with_warning("unknown gate ids fail closed")
            }
            UnknownGatePolicy::WarnAndPass => {
                warn!(gate = %id, capability = %subject.capability, "unknown gate id, passing with warning");
                GateCheck::passed(id.clone())
                    .with_warning("gate is not declared in the catalog; passed by site policy")
            }
        }
    }

    fn ownership_attestation(&self, id: &GateId, ctx: &ExecutionContext) -> GateCheck {
        if !ctx.confirmations.ownership_acknowledged {
            return GateCheck::failed(id.clone(), "ownership checkbox not acknowledged")
                .with_required_phrase(&self.manifest.ownership_phrase);
        }
        // Byte-equal: case and surrounding whitespace both count
        match ctx.confirmations.ownership_phrase.as_deref() {
            Some(phrase) if phrase == self.manifest.ownership_phrase => {
                GateCheck::passed(id.clone())
            }
            Some(_) => GateCheck::failed(id.clone(), "ownership phrase does not match")
                .with_required_phrase(&self.manifest.ownership_phrase),
            None => GateCheck::failed(id.clone(), "ownership phrase not supplied")
                .with_required_phrase(&self.manifest.ownership_phrase),
        }
    }

    fn destructive_confirmation(&self, id: &GateId, ctx: &ExecutionContext) -> GateCheck {
        // Case-insensitive but untrimmed: stray whitespace must fail
        let expected = &self.manifest.destructive_phrase;
        match ctx.confirmations.destructive_phrase.as_deref() {
            Some(phrase) if phrase.eq_ignore_ascii_case(expected) => GateCheck::passed(id.clone()),
            Some(_) => GateCheck::failed(id.clone(), "destructive confirmation phrase mismatch")
                .with_required_phrase(expected)
                .with_warning("this operation permanently destroys user data"),
            None => GateCheck::failed(id.clone(), "destructive confirmation phrase not supplied")
                .with_required_phrase(expected)
                .with_warning("this operation permanently destroys user data"),
        }
    }

    fn tool_allowlist(&self, id: &GateId, subject: &GateSubject) -> GateCheck {
        if self.snapshot.has_tool(&subject.tool) {
            GateCheck::passed(id.clone())
        } else {
            GateCheck::failed(
                id.clone(),
                format!("tool {} is not in the catalog inventory", subject.tool),
            )
        }
    }

    fn no_circumvention(&self, id: &GateId, ctx: &ExecutionContext) -> GateCheck {
        for (field, value) in &ctx.fields {
            let haystack = value.to_lowercase();
            for keyword in &self.manifest.banned_keywords {
                if haystack.contains(&keyword.to_lowercase()) {
                    return GateCheck::failed(
                        id.clone(),
                        format!("field {field:?} contains banned keyword {keyword:?}"),
                    );
                }
            }
        }
        GateCheck::passed(id.clone())
    }
}

/// The gate checks the caller's claim that an out-of-band trust event
/// occurred (USB debugging accepted, DFU entered). It does not perform
/// any authorization itself.
fn device_authorization(id: &GateId, ctx: &ExecutionContext) -> GateCheck {
    if ctx.confirmations.device_authorized {
        GateCheck::passed(id.clone())
    } else {
        GateCheck::failed(
            id.clone(),
            "no device authorization claim; accept the debug prompt on the device first",
        )
    }
}
