//! Capability and tool specifications
//!
//! A capability is a catalog-registered operation with a declared risk
//! level, allowed roles, and a required external tool. Capabilities are
//! loaded at boot and swapped only by an explicit admin reload.

use crate::ids::{CapabilityId, GateId, ToolId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Risk classification for a capability.
///
/// High and Destructive operations additionally write to the encrypted
/// shadow audit channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Destructive,
}

impl RiskLevel {
    /// Whether operations at this level are mirrored into the shadow channel.
    pub fn shadow_logged(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Destructive)
    }

    pub fn is_destructive(&self) -> bool {
        matches!(self, RiskLevel::Destructive)
    }
}

/// Bench roles recognized by the policy engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Technician,
    SeniorTechnician,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Technician => "technician",
            Role::SeniorTechnician => "senior_technician",
            Role::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

/// Coarse grouping of capabilities used by policy rule conditions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionCategory(pub String);

impl ActionCategory {
    pub fn new(category: impl Into<String>) -> Self {
        Self(category.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A catalog-registered operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub id: CapabilityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Coarse category matched by policy rule conditions (e.g. `unlock`, `flash`)
    pub category: ActionCategory,
    pub risk: RiskLevel,
    /// Roles allowed to request this capability
    pub allowed_roles: Vec<Role>,
    /// Tool the adapter invokes for this capability
    pub required_tool: ToolId,
    /// Gates that must pass before any step of this capability runs
    #[serde(default)]
    pub required_gates: Vec<GateId>,
}

impl CapabilitySpec {
    pub fn allows_role(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }
}

/// How a tool inventory entry is shaped on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Standalone executable
    Binary,
    /// Flashable archive handed to another tool
    Archive,
    /// Source tree that must be compiled before use
    SourceTree,
}

/// An external tool the shop's adapters may invoke.
///
/// The optional `digest` is a blake3 hex digest of the expected binary;
/// when set, execution is blocked unless the on-disk content matches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: ToolId,
    pub description: String,
    #[serde(default)]
    pub kind: Option<ToolKind>,
    /// Installed location, if known to the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Expected blake3 digest of the tool content (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_logging_tracks_risk() {
        assert!(!RiskLevel::Low.shadow_logged());
        assert!(!RiskLevel::Moderate.shadow_logged());
        assert!(RiskLevel::High.shadow_logged());
        assert!(RiskLevel::Destructive.shadow_logged());
    }

    #[test]
    fn risk_levels_order_by_severity() {
        assert!(RiskLevel::Low < RiskLevel::Destructive);
        assert!(RiskLevel::Moderate < RiskLevel::High);
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::SeniorTechnician).unwrap();
        assert_eq!(json, "\"senior_technician\"");
    }
}
