//! Secret redaction applied before any record leaves memory.

use forge_types::AuditEvent;
use serde_json::Value;

use crate::AuditError;

/// Placeholder written in place of any secret-bearing value.
pub const REDACTED: &str = "[REDACTED]";

const SECRET_KEY_MARKERS: &[&str] = &["password", "token", "secret", "passcode", "pin"];

fn is_secret_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SECRET_KEY_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Replace the value of every secret-bearing key, recursively.
pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_secret_key(key) {
                    *entry = Value::String(REDACTED.to_string());
                } else {
                    redact_value(entry);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item);
            }
        }
        _ => {}
    }
}

/// Serialize an event with secrets redacted. Both channels write this.
pub fn redacted_json(event: &AuditEvent) -> Result<Value, AuditError> {
    let mut value = serde_json::to_value(event)?;
    redact_value(&mut value);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_secret_keys_are_replaced() {
        let mut value = json!({
            "device": {
                "unlock_token": "abc123",
                "serial": "R58M123"
            },
            "attempts": [{"screen_passcode": "0000"}],
            "note": "customer present"
        });
        redact_value(&mut value);
        assert_eq!(value["device"]["unlock_token"], REDACTED);
        assert_eq!(value["attempts"][0]["screen_passcode"], REDACTED);
        assert_eq!(value["device"]["serial"], "R58M123");
        assert_eq!(value["note"], "customer present");
    }

    #[test]
    fn key_matching_is_case_insensitive() {
        let mut value = json!({"ApiToken": "x", "PIN": "1234"});
        redact_value(&mut value);
        assert_eq!(value["ApiToken"], REDACTED);
        assert_eq!(value["PIN"], REDACTED);
    }

    proptest::proptest! {
        #[test]
        fn redaction_is_idempotent_and_total(
            secret in "[a-z0-9]{8}",
            key in proptest::sample::select(vec![
                "password", "api_token", "secret_phrase", "passcode", "pin_code",
            ]),
        ) {
            let mut nested = serde_json::Map::new();
            nested.insert(key.to_string(), json!(secret));
            let mut map = serde_json::Map::new();
            map.insert(key.to_string(), json!(secret));
            map.insert("nested".to_string(), Value::Object(nested));
            let mut value = Value::Object(map);

            redact_value(&mut value);
            let once = value.clone();
            redact_value(&mut value);
            proptest::prop_assert_eq!(&once, &value);
            proptest::prop_assert!(!serde_json::to_string(&value).unwrap().contains(&secret));
        }
    }
}
