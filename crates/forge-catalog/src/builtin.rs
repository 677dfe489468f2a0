//! The shop's standard capability set and tool inventory.

use forge_types::{
    ActionCategory, CapabilityId, CapabilitySpec, GateId, GateKind, GateSpec, PolicyDefault,
    PolicyRule, Requirement, RiskLevel, Role, RuleOutcome, ToolId, ToolKind, ToolSpec,
};

use crate::CatalogDocument;

fn tool(id: &str, description: &str, kind: ToolKind) -> ToolSpec {
    ToolSpec {
        id: ToolId::new(id),
        description: description.to_string(),
        kind: Some(kind),
        path: None,
        digest: None,
    }
}

struct CapDef {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: &'static str,
    risk: RiskLevel,
    allowed_roles: &'static [Role],
    required_tool: &'static str,
    required_gates: &'static [&'static str],
}

const ALL_ROLES: &[Role] = &[Role::Technician, Role::SeniorTechnician, Role::Admin];
const SENIOR_UP: &[Role] = &[Role::SeniorTechnician, Role::Admin];

const CAPABILITIES: &[CapDef] = &[
    CapDef {
        id: "diagnostics_read",
        name: "Read device diagnostics",
        description: "Pull logs, battery and storage health over a debug bridge",
        category: "diagnostics",
        risk: RiskLevel::Low,
        allowed_roles: ALL_ROLES,
        required_tool: "adb",
        required_gates: &["device_authorization"],
    },
    CapDef {
        id: "device_unlock",
        name: "Carrier / screen unlock",
        description: "Remove a screen lock on a customer-owned handset",
        category: "unlock",
        risk: RiskLevel::High,
        allowed_roles: ALL_ROLES,
        required_tool: "adb",
        required_gates: &[
            "ownership_attestation",
            "device_authorization",
            "tool_allowlist",
            "no_circumvention",
        ],
    },
    CapDef {
        id: "frp_bypass",
        name: "Factory reset protection bypass",
        description: "Clear FRP after a verified ownership claim",
        category: "unlock",
        risk: RiskLevel::High,
        allowed_roles: SENIOR_UP,
        required_tool: "adb",
        required_gates: &[
            "ownership_attestation",
            "device_authorization",
            "tool_allowlist",
            "no_circumvention",
        ],
    },
    CapDef {
        id: "bootloader_unlock",
        name: "Bootloader unlock",
        description: "Unlock the bootloader via fastboot OEM commands",
        category: "unlock",
        risk: RiskLevel::High,
        allowed_roles: SENIOR_UP,
        required_tool: "fastboot",
        required_gates: &[
            "ownership_attestation",
            "device_authorization",
            "tool_allowlist",
        ],
    },
    CapDef {
        id: "firmware_flash",
        name: "Firmware flash",
        description: "Write a full firmware image to the device",
        category: "flash",
        risk: RiskLevel::Destructive,
        allowed_roles: SENIOR_UP,
        required_tool: "heimdall",
        required_gates: &[
            "ownership_attestation",
            "device_authorization",
            "destructive_confirmation",
            "tool_allowlist",
        ],
    },
    CapDef {
        id: "jailbreak",
        name: "Jailbreak",
        description: "Boot a checkm8-class exploit chain on a supported handset",
        category: "jailbreak",
        risk: RiskLevel::High,
        allowed_roles: SENIOR_UP,
        required_tool: "checkra1n",
        required_gates: &[
            "ownership_attestation",
            "device_authorization",
            "tool_allowlist",
            "no_circumvention",
        ],
    },
    CapDef {
        id: "data_wipe",
        name: "Full data wipe",
        description: "Factory erase of all user data before resale or recycling",
        category: "wipe",
        risk: RiskLevel::Destructive,
        allowed_roles: SENIOR_UP,
        required_tool: "fastboot",
        required_gates: &[
            "ownership_attestation",
            "destructive_confirmation",
            "tool_allowlist",
        ],
    },
];

/// The built-in catalog document the shop ships with.
///
/// Deployments normally load a site document instead; this one doubles as
/// the fixture for most engine tests.
pub fn builtin_document() -> CatalogDocument {
    let tools = vec![
        tool("adb", "Android debug bridge", ToolKind::Binary),
        tool("fastboot", "Android fastboot flasher", ToolKind::Binary),
        tool("checkra1n", "checkm8 jailbreak for A5-A11 devices", ToolKind::Binary),
        tool("palera1n", "checkm8 jailbreak for iOS 15+", ToolKind::Binary),
        tool("gaster", "checkm8 pwned DFU utility", ToolKind::SourceTree),
        tool("heimdall", "Samsung Odin-protocol flasher", ToolKind::Binary),
        tool("mtkclient", "MediaTek BROM exploitation client", ToolKind::SourceTree),
    ];

    let gates = vec![
        GateSpec {
            id: GateId::new("ownership_attestation"),
            kind: GateKind::OwnershipAttestation,
        },
        GateSpec {
            id: GateId::new("device_authorization"),
            kind: GateKind::DeviceAuthorization,
        },
        GateSpec {
            id: GateId::new("destructive_confirmation"),
            kind: GateKind::DestructiveConfirmation,
        },
        GateSpec {
            id: GateId::new("tool_allowlist"),
            kind: GateKind::ToolAllowlist,
        },
        GateSpec {
            id: GateId::new("no_circumvention"),
            kind: GateKind::NoCircumvention,
        },
    ];

    let capabilities = CAPABILITIES
        .iter()
        .map(|def| CapabilitySpec {
            id: CapabilityId::new(def.id),
            name: def.name.to_string(),
            description: def.description.to_string(),
            category: ActionCategory::new(def.category),
            risk: def.risk,
            allowed_roles: def.allowed_roles.to_vec(),
            required_tool: ToolId::new(def.required_tool),
            required_gates: def.required_gates.iter().map(|g| GateId::new(*g)).collect(),
        })
        .collect();

    let policy_rules = vec![
        PolicyRule {
            id: "deny-destructive-for-technicians".to_string(),
            categories: None,
            roles: Some(vec![Role::Technician]),
            risk_levels: Some(vec![RiskLevel::Destructive]),
            outcome: RuleOutcome::Deny,
            requirements: Vec::new(),
            reason: Some("destructive work requires a senior technician".to_string()),
        },
        PolicyRule {
            id: "destructive-needs-cosign".to_string(),
            categories: None,
            roles: None,
            risk_levels: Some(vec![RiskLevel::Destructive]),
            outcome: RuleOutcome::AllowWithRequirements,
            requirements: vec![Requirement::Cosign, Requirement::IntakeFormOnFile],
            reason: Some("destructive work needs a co-signer and intake form".to_string()),
        },
        PolicyRule {
            id: "unlock-needs-intake-form".to_string(),
            categories: Some(vec![
                ActionCategory::new("unlock"),
                ActionCategory::new("jailbreak"),
            ]),
            roles: None,
            risk_levels: None,
            outcome: RuleOutcome::AllowWithRequirements,
            requirements: vec![Requirement::IntakeFormOnFile],
            reason: Some("unlock work needs the customer intake form on file".to_string()),
        },
        PolicyRule {
            id: "allow-low-and-moderate".to_string(),
            categories: None,
            roles: None,
            risk_levels: Some(vec![RiskLevel::Low, RiskLevel::Moderate]),
            outcome: RuleOutcome::Allow,
            requirements: Vec::new(),
            reason: None,
        },
        PolicyRule {
            id: "allow-high-for-seniors".to_string(),
            categories: None,
            roles: Some(vec![Role::SeniorTechnician, Role::Admin]),
            risk_levels: Some(vec![RiskLevel::High]),
            outcome: RuleOutcome::Allow,
            requirements: Vec::new(),
            reason: None,
        },
    ];

    CatalogDocument {
        version: "builtin-2026.08".to_string(),
        capabilities,
        tools,
        gates,
        policy_rules,
        policy_default: PolicyDefault::Deny,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_required_gate_is_declared() {
        let doc = builtin_document();
        for cap in &doc.capabilities {
            for gate in &cap.required_gates {
                assert!(
                    doc.gates.iter().any(|g| &g.id == gate),
                    "{} references undeclared gate {}",
                    cap.id,
                    gate
                );
            }
        }
    }

    #[test]
    fn destructive_capabilities_require_the_confirmation_gate() {
        let doc = builtin_document();
        for cap in &doc.capabilities {
            if cap.risk.is_destructive() {
                assert!(
                    cap.required_gates
                        .contains(&GateId::new("destructive_confirmation")),
                    "{} is destructive but lacks the confirmation gate",
                    cap.id
                );
            }
        }
    }
}
