//! BootForge workflow executor
//!
//! Orchestrates one privileged operation end to end: validation, catalog
//! resolution, policy, gates, tool digest verification, admission, audited
//! step execution, and the uniform response envelope. Simulation runs the
//! same checks with no side effects.

#![deny(unsafe_code)]

mod adapter;
mod executor;
mod run;

pub use adapter::{ToolAdapter, ToolError};
pub use executor::{ExecutorConfig, WorkflowExecutor};
pub use run::RunStatus;
