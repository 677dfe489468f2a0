//! Identifier newtypes used across the workspace.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id! {
    /// Catalog-registered operation identifier (e.g. `frp_bypass`)
    CapabilityId
}

string_id! {
    /// External tool binary identifier (e.g. `checkra1n`)
    ToolId
}

string_id! {
    /// Named precondition gate identifier (e.g. `destructive_confirmation`)
    GateId
}

string_id! {
    /// Workflow definition identifier
    WorkflowId
}

string_id! {
    /// Authenticated client (workstation or technician login) identifier
    ClientId
}

string_id! {
    /// Caller-supplied identifier threaded through responses and audit records
    CorrelationId
}

/// Unique identifier for one workflow run / privileged operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines. Ids are caller-supplied, so
    /// the cut respects char boundaries.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((index, _)) => &self.0[..index],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
