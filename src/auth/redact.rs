//! Redaction of sensitive fields from request/response bodies before they
//! reach logs or the usage ledger.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashSet;

static SENSITIVE_FIELDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "messages", "prompt", "input", "content", "text",
        "api_key", "authorization", "x-api-key", "password",
        "secret", "token", "key",
    ]
    .into_iter()
    .collect()
});

/// Recursively redact sensitive keys from a JSON value, replacing their
/// content with a length-preserving placeholder so shape stays inspectable.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if SENSITIVE_FIELDS.contains(key.to_lowercase().as_str()) {
                    redacted.insert(key.clone(), redact_leaf(val));
                } else {
                    redacted.insert(key.clone(), redact(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

fn redact_leaf(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(format!("[REDACTED:{} chars]", s.len())),
        Value::Array(items) => Value::String(format!("[REDACTED:{} items]", items.len())),
        Value::Object(_) => Value::String("[REDACTED]".to_string()),
        _ => Value::String("[REDACTED]".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_known_sensitive_fields() {
        let input = json!({"messages": [{"role": "user", "content": "hi"}], "model": "gpt"});
        let redacted = redact(&input);
        assert_eq!(redacted["model"], json!("gpt"));
        assert!(redacted["messages"].as_str().unwrap().starts_with("[REDACTED:"));
    }

    #[test]
    fn recurses_into_nested_objects() {
        let input = json!({"outer": {"api_key": "sk-secret", "note": "fine"}});
        let redacted = redact(&input);
        assert!(redacted["outer"]["api_key"].as_str().unwrap().starts_with("[REDACTED:"));
        assert_eq!(redacted["outer"]["note"], json!("fine"));
    }
}
