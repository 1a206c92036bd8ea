//! Credential redaction for structured log fields.

use serde_json::{Map, Value};

/// Replacement written in place of a sensitive value.
pub const REDACTED: &str = "[REDACTED]";

const DENYLIST_KEYS: [&str; 8] = [
    "token",
    "access_token",
    "refresh_token",
    "authorization",
    "cookie",
    "password",
    "secret",
    "bearer",
];

/// Returns true when a field name should never reach a log sink verbatim.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS
        .iter()
        .any(|denied| lower == *denied || lower.ends_with(&format!("_{denied}")))
}

pub(crate) fn sanitize_value(key: &str, value: Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) if looks_like_bearer(&s) => Value::String(REDACTED.to_string()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let clean = sanitize_value(&k, v);
                out.insert(k, clean);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| sanitize_value(key, item))
                .collect(),
        ),
        other => other,
    }
}

fn looks_like_bearer(raw: &str) -> bool {
    raw.len() > 7 && raw[..7].eq_ignore_ascii_case("bearer ")
}
