//! Tool content-digest verification.
//!
//! Inventory entries may carry an expected blake3 digest of the installed
//! binary. A mismatch is a hard integrity failure that blocks execution;
//! an entry without a configured digest passes with a logged warning.

use forge_types::ToolSpec;
use tracing::warn;

use crate::CatalogError;

/// Outcome of verifying one tool against its inventory entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DigestCheck {
    /// On-disk content matches the configured digest
    Verified,
    /// No digest configured for this tool
    Unverified,
}

/// Hash the tool's installed content and compare against the configured
/// digest. Digests compare case-insensitively as hex strings.
pub fn verify_tool_digest(tool: &ToolSpec) -> Result<DigestCheck, CatalogError> {
    let Some(expected) = tool.digest.as_deref() else {
        warn!(tool = %tool.id, "no content digest configured, skipping verification");
        return Ok(DigestCheck::Unverified);
    };

    let path = tool
        .path
        .as_deref()
        .ok_or_else(|| CatalogError::ToolPathUnknown {
            tool: tool.id.clone(),
        })?;

    let content = std::fs::read(path)?;
    let actual = blake3::hash(&content).to_hex().to_string();

    if actual.eq_ignore_ascii_case(expected) {
        Ok(DigestCheck::Verified)
    } else {
        Err(CatalogError::DigestMismatch {
            tool: tool.id.clone(),
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_types::{ToolId, ToolKind};
    use std::io::Write;

    fn tool_on_disk(content: &[u8]) -> (tempfile::NamedTempFile, ToolSpec) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        let spec = ToolSpec {
            id: ToolId::new("gaster"),
            description: "test tool".to_string(),
            kind: Some(ToolKind::Binary),
            path: Some(file.path().to_path_buf()),
            digest: None,
        };
        (file, spec)
    }

    #[test]
    fn matching_digest_verifies() {
        let (_file, mut spec) = tool_on_disk(b"tool bytes");
        spec.digest = Some(blake3::hash(b"tool bytes").to_hex().to_string());
        assert_eq!(verify_tool_digest(&spec).unwrap(), DigestCheck::Verified);
    }

    #[test]
    fn digest_comparison_is_case_insensitive() {
        let (_file, mut spec) = tool_on_disk(b"tool bytes");
        spec.digest = Some(blake3::hash(b"tool bytes").to_hex().to_string().to_uppercase());
        assert_eq!(verify_tool_digest(&spec).unwrap(), DigestCheck::Verified);
    }

    #[test]
    fn mismatched_digest_is_an_integrity_failure() {
        let (_file, mut spec) = tool_on_disk(b"tampered bytes");
        spec.digest = Some(blake3::hash(b"tool bytes").to_hex().to_string());
        let err = verify_tool_digest(&spec).unwrap_err();
        assert!(matches!(err, CatalogError::DigestMismatch { .. }));
    }

    #[test]
    fn missing_digest_passes_unverified() {
        let (_file, spec) = tool_on_disk(b"tool bytes");
        assert_eq!(verify_tool_digest(&spec).unwrap(), DigestCheck::Unverified);
    }

    #[test]
    fn digest_without_path_is_rejected() {
        let spec = ToolSpec {
            id: ToolId::new("checkra1n"),
            description: "test tool".to_string(),
            kind: Some(ToolKind::Binary),
            path: None,
            digest: Some("ab".repeat(32)),
        };
        let err = verify_tool_digest(&spec).unwrap_err();
        assert!(matches!(err, CatalogError::ToolPathUnknown { .. }));
    }
}
