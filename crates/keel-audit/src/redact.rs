// redact.rs — Parameter redaction applied before an audit entry is stored.
//
// Two rules, applied to the top level of the parameter map only:
//   1. A key that case-insensitively equals one of SENSITIVE_KEYS has its
//      value replaced with REDACTED, whatever the value's type.
//   2. Any other string value longer than MAX_PARAM_CHARS characters is cut
//      to MAX_PARAM_CHARS characters followed by TRUNCATION_MARKER.
//
// Nested objects and arrays inside parameter values are stored as-is.
// A secret inside `{"headers": {"Authorization": "..."}}` is NOT redacted;
// callers that pass nested credentials must flatten or strip them first.

use serde_json::{Map, Value};

/// Marker stored in place of a sensitive parameter value.
pub const REDACTED: &str = "[REDACTED]";

/// Appended to string values that were truncated.
pub const TRUNCATION_MARKER: &str = "...";

/// Longest string value (in characters) stored without truncation.
pub const MAX_PARAM_CHARS: usize = 200;

/// Parameter names whose values are never written to the audit trail.
/// Compared case-insensitively, so `apiKey`, `APIKEY` and `apikey` all match.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "key",
    "apikey",
    "api_key",
    "authorization",
    "cookie",
    "credentials",
];

/// Whether a top-level parameter name must be redacted.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.contains(&lower.as_str())
}

/// Return a redacted copy of a tool-call parameter map.
pub fn redact_params(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .map(|(key, value)| {
            let stored = if is_sensitive_key(key) {
                Value::String(REDACTED.to_string())
            } else {
                match value {
                    Value::String(s) => Value::String(truncate(s)),
                    other => other.clone(),
                }
            };
            (key.clone(), stored)
        })
        .collect()
}

/// Truncate on character boundaries so multi-byte text never splits.
fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_PARAM_CHARS {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(MAX_PARAM_CHARS).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn sensitive_key_is_redacted_case_insensitively() {
        let redacted = redact_params(&params(json!({"Password": "x", "note": "y"})));
        assert_eq!(
            Value::Object(redacted),
            json!({"Password": "[REDACTED]", "note": "y"})
        );
    }

    #[test]
    fn every_sensitive_key_variant_is_redacted() {
        let redacted = redact_params(&params(json!({
            "password": "a",
            "TOKEN": "b",
            "Secret": "c",
            "key": "d",
            "apiKey": "e",
            "api_key": "f",
            "Authorization": "Bearer g",
            "cookie": "h",
            "credentials": {"user": "i"},
        })));
        assert_eq!(redacted.len(), 9);
        assert!(redacted.values().all(|v| v == REDACTED));
    }

    #[test]
    fn keys_that_merely_contain_a_sensitive_word_are_kept() {
        let redacted = redact_params(&params(json!({"keyboard": "qwerty", "tokens_used": 12})));
        assert_eq!(redacted["keyboard"], "qwerty");
        assert_eq!(redacted["tokens_used"], 12);
    }

    #[test]
    fn long_string_is_truncated_with_marker() {
        let long = "a".repeat(250);
        let redacted = redact_params(&params(json!({ "body": long })));
        let stored = redacted["body"].as_str().unwrap();
        assert_eq!(stored.len(), MAX_PARAM_CHARS + TRUNCATION_MARKER.len());
        assert!(stored.starts_with(&"a".repeat(200)));
        assert!(stored.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn string_at_limit_is_untouched() {
        let exact = "b".repeat(MAX_PARAM_CHARS);
        let redacted = redact_params(&params(json!({ "body": exact.clone() })));
        assert_eq!(redacted["body"], Value::String(exact));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let long = "é".repeat(201);
        let redacted = redact_params(&params(json!({ "text": long })));
        let stored = redacted["text"].as_str().unwrap();
        assert_eq!(stored.chars().count(), MAX_PARAM_CHARS + TRUNCATION_MARKER.len());
    }

    #[test]
    fn redaction_is_top_level_only() {
        // Nested values pass through unchanged; this is documented behavior.
        let redacted = redact_params(&params(json!({
            "headers": {"Authorization": "Bearer abc"},
            "items": ["x".repeat(300)],
        })));
        assert_eq!(redacted["headers"]["Authorization"], "Bearer abc");
        assert_eq!(redacted["items"][0].as_str().unwrap().len(), 300);
    }

    #[test]
    fn non_string_values_are_kept() {
        let redacted = redact_params(&params(json!({"count": 3, "ok": true, "none": null})));
        assert_eq!(Value::Object(redacted), json!({"count": 3, "ok": true, "none": null}));
    }
}
