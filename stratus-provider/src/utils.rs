//! Utility functions for identifier normalization and conversion

/// Prefixes that mark a network token as an already-resolved reference
pub const NETWORK_REFERENCE_PREFIXES: &[&str] = &["network-", "networkGroup-", "subnet-"];

/// Normalize a JSON identifier to its string form.
///
/// Numbers are truncated to integers (option rows often carry ids as floats,
/// e.g. `12.0` -> `"12"`). Strings are trimmed. Anything else has no identifier form.
pub fn normalize_identifier(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().map(|f| (f.trunc() as i64).to_string())
            }
        }
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Coerce a JSON value to an integer, truncating floats and parsing numeric strings
pub fn coerce_integer(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

/// Render an identifier for a request body: integer ids go out as numbers, others as strings
pub fn identifier_to_json(id: &str) -> serde_json::Value {
    match id.parse::<i64>() {
        Ok(i) => serde_json::Value::from(i),
        Err(_) => serde_json::Value::String(id.to_string()),
    }
}

/// Whether a network token is already an opaque reference and needs no lookup
pub fn is_network_reference(token: &str) -> bool {
    NETWORK_REFERENCE_PREFIXES
        .iter()
        .any(|prefix| token.len() > prefix.len() && token.starts_with(prefix))
}

/// Treat empty or whitespace-only tokens as absent
pub fn non_empty(token: Option<&str>) -> Option<&str> {
    token.map(str::trim).filter(|t| !t.is_empty())
}
