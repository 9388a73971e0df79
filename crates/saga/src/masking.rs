//! Masking of sensitive payload fields.

use serde_json::{Map, Value};

/// Fields masked when no list is configured.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &["ssn", "password", "token"];

/// Replacement written over sensitive string values.
pub const MASK: &str = "***";

/// Replaces top-level string values of the sensitive `fields` with [`MASK`].
///
/// Non-string values are left as they are.
pub fn mask_fields(payload: &Map<String, Value>, fields: &[String]) -> Map<String, Value> {
    payload
        .iter()
        .map(|(key, value)| {
            let masked = if value.is_string() && fields.iter().any(|f| f == key) {
                Value::String(MASK.to_string())
            } else {
                value.clone()
            };
            (key.clone(), masked)
        })
        .collect()
}
