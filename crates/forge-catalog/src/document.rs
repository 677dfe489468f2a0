//! The on-disk catalog document.

use forge_types::{CapabilitySpec, GateSpec, PolicyDefault, PolicyRule, ToolSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::CatalogError;

/// Versioned static document the catalog is built from.
///
/// Rule order in `policy_rules` is evaluation order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub version: String,
    pub capabilities: Vec<CapabilitySpec>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub gates: Vec<GateSpec>,
    #[serde(default)]
    pub policy_rules: Vec<PolicyRule>,
    #[serde(default)]
    pub policy_default: PolicyDefault,
}

impl CatalogDocument {
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
