//! Request body sanitization
//!
//! Object keys that look like query operators (`$gt`) or paths (`a.b`) are
//! removed at every depth, and `<`/`>` in strings are escaped. Credential
//! fields are never rewritten: they are hashed, not rendered.

use serde_json::{Map, Value};

/// Fields whose string values pass through unescaped
const CREDENTIAL_FIELDS: [&str; 3] = ["password", "passwordConfirm", "passwordCurrent"];

/// Clean a JSON value from an untrusted body
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !key.starts_with('$') && !key.contains('.'))
                .map(|(key, value)| match value {
                    Value::String(_) if CREDENTIAL_FIELDS.contains(&key.as_str()) => (key, value),
                    value => (key, sanitize(value)),
                })
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::String(text) => Value::String(escape_html(&text)),
        other => other,
    }
}

fn escape_html(text: &str) -> String {
    if !text.contains(['<', '>']) {
        return text.to_string();
    }
    text.replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_keys_removed_at_depth() {
        let cleaned = sanitize(json!({
            "email": {"$gt": ""},
            "name": "Ann",
            "nested": [{"a.b": 1, "ok": 2}],
        }));
        assert_eq!(cleaned, json!({"email": {}, "name": "Ann", "nested": [{"ok": 2}]}));
    }

    #[test]
    fn test_markup_escaped() {
        let cleaned = sanitize(json!({"name": "<script>alert(1)</script>"}));
        assert_eq!(cleaned["name"], json!("&lt;script&gt;alert(1)&lt;/script&gt;"));
    }

    #[test]
    fn test_credentials_kept_verbatim() {
        let cleaned = sanitize(json!({
            "name": "<b>Ann</b>",
            "password": "p<ss>word1",
            "passwordConfirm": "p<ss>word1",
            "passwordCurrent": "<old>pass",
        }));
        assert_eq!(cleaned["password"], json!("p<ss>word1"));
        assert_eq!(cleaned["passwordConfirm"], json!("p<ss>word1"));
        assert_eq!(cleaned["passwordCurrent"], json!("<old>pass"));
        assert_eq!(cleaned["name"], json!("&lt;b&gt;Ann&lt;/b&gt;"));
    }
}
