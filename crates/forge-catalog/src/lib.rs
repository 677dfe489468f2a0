//! BootForge capability catalog
//!
//! The catalog is the single source of truth for what the shop can do:
//! capabilities, the external tools they invoke, gate declarations, and the
//! policy rule set. It is loaded from a versioned document at boot and held
//! as an immutable snapshot; an admin reload swaps the snapshot atomically
//! while in-flight evaluations keep the one they resolved against.

#![deny(unsafe_code)]

mod builtin;
mod catalog;
mod document;
mod verify;

pub use builtin::builtin_document;
pub use catalog::{CapabilityCatalog, CatalogSnapshot};
pub use document::CatalogDocument;
pub use verify::{verify_tool_digest, DigestCheck};

use forge_types::{CapabilityId, GateId, ToolId};
use thiserror::Error;

/// Catalog-related errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Fails closed: the requested operation is not registered
    #[error("unknown capability: {0}")]
    UnknownCapability(CapabilityId),

    #[error("unknown tool: {0}")]
    UnknownTool(ToolId),

    #[error("duplicate capability id in document: {0}")]
    DuplicateCapability(CapabilityId),

    #[error("duplicate tool id in document: {0}")]
    DuplicateTool(ToolId),

    #[error("capability {capability} requires undeclared tool {tool}")]
    MissingTool {
        capability: CapabilityId,
        tool: ToolId,
    },

    #[error("capability {capability} requires undeclared gate {gate}")]
    MissingGate {
        capability: CapabilityId,
        gate: GateId,
    },

    #[error("tool {tool} has no installed path to verify")]
    ToolPathUnknown { tool: ToolId },

    #[error("tool {tool} content digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        tool: ToolId,
        expected: String,
        actual: String,
    },

    #[error("catalog document parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("catalog io error: {0}")]
    Io(#[from] std::io::Error),
}
