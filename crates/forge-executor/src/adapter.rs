//! Tool adapter seam.
//!
//! The adapter is the only component that touches a device. It is handed
//! work after policy, gates, and admission have all cleared; it is never
//! trusted to re-check confirmations, and destructive capabilities must
//! assume the destructive-confirmation gate already ran.

use async_trait::async_trait;
use forge_types::CapabilityId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool failed: {0}")]
    Failed(String),

    #[error("tool timed out")]
    TimedOut,

    #[error("tool unavailable: {0}")]
    Unavailable(String),
}

/// Invokes the external tool backing a capability.
///
/// Implementations must be safe to call again for the same step when the
/// step's failure policy is retry.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    async fn invoke(
        &self,
        capability: &CapabilityId,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;
}
