//! Shadow-channel encryption.
//!
//! Each record is the redacted event JSON encrypted with ChaCha20-Poly1305
//! under a random per-entry nonce. The Poly1305 tag is stored in its own
//! field, and a blake3 hash over the plaintext lets a reader re-verify
//! content integrity independently of the cipher.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use forge_types::AuditEvent;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::redact::redacted_json;
use crate::AuditError;

pub const SHADOW_KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// 256-bit shadow-channel key.
#[derive(Clone)]
pub struct ShadowKey {
    bytes: [u8; SHADOW_KEY_SIZE],
}

impl ShadowKey {
    pub fn from_bytes(bytes: [u8; SHADOW_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; SHADOW_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_hex(encoded: &str) -> Result<Self, AuditError> {
        let decoded = hex::decode(encoded)?;
        if decoded.len() != SHADOW_KEY_SIZE {
            return Err(AuditError::KeyLength {
                expected: SHADOW_KEY_SIZE,
                actual: decoded.len(),
            });
        }
        let mut bytes = [0u8; SHADOW_KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new((&self.bytes).into())
    }
}

impl std::fmt::Debug for ShadowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowKey").finish_non_exhaustive()
    }
}

/// One encrypted line in a shadow partition. All fields hex-encoded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShadowRecord {
    /// Random 12-byte nonce
    pub iv: String,
    /// Ciphertext without the authentication tag
    pub ciphertext: String,
    /// Poly1305 tag, split from the cipher output
    pub auth_tag: String,
    /// blake3 of the plaintext, computed before encryption
    pub hash: String,
}

impl ShadowRecord {
    /// Redact, serialize, hash, and encrypt one event.
    pub fn seal(key: &ShadowKey, event: &AuditEvent) -> Result<Self, AuditError> {
        let plaintext = serde_json::to_vec(&redacted_json(event)?)?;
        let hash = blake3::hash(&plaintext);

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut sealed = key
            .cipher()
            .encrypt((&nonce).into(), plaintext.as_slice())
            .map_err(|_| AuditError::Encrypt)?;
        let tag = sealed.split_off(sealed.len() - TAG_SIZE);

        Ok(Self {
            iv: hex::encode(nonce),
            ciphertext: hex::encode(sealed),
            auth_tag: hex::encode(tag),
            hash: hash.to_hex().to_string(),
        })
    }

    /// Decrypt and verify one record. Any failure yields a reason string
    /// instead of an error so a bad entry never aborts a partition read.
    pub fn open(&self, key: &ShadowKey) -> Result<AuditEvent, String> {
        let iv = hex::decode(&self.iv).map_err(|_| "iv is not valid hex".to_string())?;
        if iv.len() != NONCE_SIZE {
            return Err(format!("iv must be {NONCE_SIZE} bytes, got {}", iv.len()));
        }
        let mut combined =
            hex::decode(&self.ciphertext).map_err(|_| "ciphertext is not valid hex".to_string())?;
        let tag = hex::decode(&self.auth_tag).map_err(|_| "auth_tag is not valid hex".to_string())?;
        combined.extend_from_slice(&tag);

        let nonce: [u8; NONCE_SIZE] = iv.as_slice().try_into().map_err(|_| "bad iv".to_string())?;
        let plaintext = key
            .cipher()
            .decrypt((&nonce).into(), combined.as_slice())
            .map_err(|_| "authentication failed".to_string())?;

        let actual = blake3::hash(&plaintext).to_hex().to_string();
        if !actual.eq_ignore_ascii_case(&self.hash) {
            return Err("content hash mismatch".to_string());
        }

        serde_json::from_slice(&plaintext).map_err(|e| format!("undecodable plaintext: {e}"))
    }
}

/// Result of reading one line of a shadow partition.
#[derive(Debug)]
pub enum ShadowEntry {
    Intact(AuditEvent),
    /// The raw line plus why it failed verification
    Tampered { record: String, reason: String },
}

impl ShadowEntry {
    pub fn is_tampered(&self) -> bool {
        matches!(self, ShadowEntry::Tampered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_types::{AuditStage, OperationId, Role};

    fn event() -> AuditEvent {
        AuditEvent::new(
            AuditStage::OperationStarted,
            OperationId::generate(),
            "case-9",
            "tech-2",
            Role::SeniorTechnician,
        )
    }

    #[test]
    fn sealed_record_opens_back_to_the_event() {
        let key = ShadowKey::generate();
        let original = event();
        let record = ShadowRecord::seal(&key, &original).unwrap();
        let opened = record.open(&key).unwrap();
        assert_eq!(opened, original);
    }

    #[test]
    fn tag_lives_in_its_own_field() {
        let key = ShadowKey::generate();
        let record = ShadowRecord::seal(&key, &event()).unwrap();
        assert_eq!(hex::decode(&record.auth_tag).unwrap().len(), TAG_SIZE);
        assert_eq!(hex::decode(&record.iv).unwrap().len(), NONCE_SIZE);
    }

    #[test]
    fn flipped_ciphertext_fails_authentication() {
        let key = ShadowKey::generate();
        let mut record = ShadowRecord::seal(&key, &event()).unwrap();
        let mut bytes = hex::decode(&record.ciphertext).unwrap();
        bytes[0] ^= 0xff;
        record.ciphertext = hex::encode(bytes);
        assert_eq!(record.open(&key).unwrap_err(), "authentication failed");
    }

    #[test]
    fn flipped_auth_tag_fails_authentication() {
        let key = ShadowKey::generate();
        let mut record = ShadowRecord::seal(&key, &event()).unwrap();
        let mut bytes = hex::decode(&record.auth_tag).unwrap();
        bytes[0] ^= 0xff;
        record.auth_tag = hex::encode(bytes);
        assert_eq!(record.open(&key).unwrap_err(), "authentication failed");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let record = ShadowRecord::seal(&ShadowKey::generate(), &event()).unwrap();
        assert_eq!(
            record.open(&ShadowKey::generate()).unwrap_err(),
            "authentication failed"
        );
    }

    #[test]
    fn corrupted_hash_is_detected_independently() {
        let key = ShadowKey::generate();
        let mut record = ShadowRecord::seal(&key, &event()).unwrap();
        record.hash = blake3::hash(b"something else").to_hex().to_string();
        assert_eq!(record.open(&key).unwrap_err(), "content hash mismatch");
    }

    #[test]
    fn key_debug_never_prints_material() {
        let key = ShadowKey::from_bytes([7u8; SHADOW_KEY_SIZE]);
        let printed = format!("{key:?}");
        assert!(!printed.contains("07"));
    }

    #[test]
    fn hex_key_roundtrip_enforces_length() {
        let key = ShadowKey::generate();
        let encoded = hex::encode(key.bytes);
        assert!(ShadowKey::from_hex(&encoded).is_ok());
        assert!(matches!(
            ShadowKey::from_hex("abcd"),
            Err(AuditError::KeyLength { .. })
        ));
    }
}
