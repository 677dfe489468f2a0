//! Snapshot-backed catalog with atomic admin reload.

use forge_types::{
    CapabilityId, CapabilitySpec, GateId, GateSpec, PolicyDefault, PolicyRule, ToolId, ToolSpec,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::{CatalogDocument, CatalogError};

/// An immutable, validated view of one catalog document.
///
/// Holders of an `Arc<CatalogSnapshot>` keep seeing the version they
/// resolved against even if an admin reload swaps the catalog underneath.
#[derive(Debug)]
pub struct CatalogSnapshot {
    version: String,
    capabilities: HashMap<CapabilityId, CapabilitySpec>,
    capability_order: Vec<CapabilityId>,
    tools: HashMap<ToolId, ToolSpec>,
    gates: HashMap<GateId, GateSpec>,
    policy_rules: Vec<PolicyRule>,
    policy_default: PolicyDefault,
}

impl CatalogSnapshot {
    fn build(doc: CatalogDocument) -> Result<Self, CatalogError> {
        let mut tools = HashMap::new();
        for tool in doc.tools {
            if tools.insert(tool.id.clone(), tool.clone()).is_some() {
                return Err(CatalogError::DuplicateTool(tool.id));
            }
        }

        let mut gates = HashMap::new();
        for gate in doc.gates {
            gates.insert(gate.id.clone(), gate);
        }

        let mut capabilities = HashMap::new();
        let mut capability_order = Vec::with_capacity(doc.capabilities.len());
        for cap in doc.capabilities {
            if !tools.contains_key(&cap.required_tool) {
                return Err(CatalogError::MissingTool {
                    capability: cap.id,
                    tool: cap.required_tool,
                });
            }
            for gate in &cap.required_gates {
                if !gates.contains_key(gate) {
                    return Err(CatalogError::MissingGate {
                        capability: cap.id,
                        gate: gate.clone(),
                    });
                }
            }
            capability_order.push(cap.id.clone());
            if capabilities.insert(cap.id.clone(), cap.clone()).is_some() {
                return Err(CatalogError::DuplicateCapability(cap.id));
            }
        }

        Ok(Self {
            version: doc.version,
            capabilities,
            capability_order,
            tools,
            gates,
            policy_rules: doc.policy_rules,
            policy_default: doc.policy_default,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resolve a capability id or fail closed.
    pub fn resolve(&self, id: &CapabilityId) -> Result<&CapabilitySpec, CatalogError> {
        self.capabilities
            .get(id)
            .ok_or_else(|| CatalogError::UnknownCapability(id.clone()))
    }

    pub fn tool(&self, id: &ToolId) -> Result<&ToolSpec, CatalogError> {
        self.tools
            .get(id)
            .ok_or_else(|| CatalogError::UnknownTool(id.clone()))
    }

    pub fn has_tool(&self, id: &ToolId) -> bool {
        self.tools.contains_key(id)
    }

    pub fn gate(&self, id: &GateId) -> Option<&GateSpec> {
        self.gates.get(id)
    }

    pub fn policy_rules(&self) -> &[PolicyRule] {
        &self.policy_rules
    }

    pub fn policy_default(&self) -> PolicyDefault {
        self.policy_default
    }

    /// Capabilities in document declaration order.
    pub fn capabilities(&self) -> impl Iterator<Item = &CapabilitySpec> {
        self.capability_order
            .iter()
            .filter_map(|id| self.capabilities.get(id))
    }

    pub fn tools(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }
}

/// Thread-safe handle to the current catalog snapshot.
#[derive(Debug)]
pub struct CapabilityCatalog {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl CapabilityCatalog {
    pub fn from_document(doc: CatalogDocument) -> Result<Self, CatalogError> {
        let snapshot = CatalogSnapshot::build(doc)?;
        info!(version = %snapshot.version, "catalog loaded");
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Current snapshot; cheap to clone and safe to hold across awaits.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned lock still holds a valid snapshot
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Validate and swap in a new document. On any validation error the
    /// previous snapshot stays in place.
    pub fn reload(&self, doc: CatalogDocument) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        let snapshot = Arc::new(CatalogSnapshot::build(doc)?);
        let previous = {
            let mut guard = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::replace(&mut *guard, Arc::clone(&snapshot))
        };
        info!(
            from = %previous.version,
            to = %snapshot.version,
            "catalog reloaded"
        );
        Ok(snapshot)
    }
}
