//! BootForge audit ledger
//!
//! Two append-only log families partitioned by UTC date: a plaintext
//! public channel for operational visibility and an encrypted,
//! tamper-evident shadow channel for high and destructive-risk work.
//! Secret-bearing fields are redacted before serialization in both
//! channels. Mutation is only possible as whole-day retention rotation.

#![deny(unsafe_code)]

mod ledger;
mod redact;
mod shadow;

pub use ledger::AuditLedger;
pub use redact::{redact_value, redacted_json, REDACTED};
pub use shadow::{ShadowEntry, ShadowKey, ShadowRecord};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("shadow encryption failed")]
    Encrypt,

    #[error("shadow key must be {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },

    #[error("invalid shadow key encoding: {0}")]
    KeyEncoding(#[from] hex::FromHexError),
}
