//! Filter values
//!
//! Request parameters arrive as loosely-typed JSON values. This module holds
//! the rules for deciding whether a value is "absent" and how values are
//! measured and canonically encoded.

use std::collections::BTreeMap;

use serde_json::Value;

/// A single request parameter value
pub type FilterValue = Value;

/// Active filterables keyed by filter key
///
/// Kept sorted so dispatch order and cache keys never depend on insertion order.
pub type Filterables = BTreeMap<String, FilterValue>;

/// Free-form runtime options bag
pub type Options = BTreeMap<String, FilterValue>;

/// Whether a value counts as "not supplied"
///
/// Only `null`, `""`, `false` and empty collections are absent. `0` and `"0"`
/// are meaningful and stay active.
pub fn is_absent(value: &FilterValue) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

/// Element count for collection values, `None` for scalars
pub fn collection_len(value: &FilterValue) -> Option<usize> {
    match value {
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

/// String form of a scalar value
pub fn scalar_string(value: &FilterValue) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

/// Stable serialization with object keys sorted at every level
///
/// Does not rely on the map ordering `serde_json` was compiled with.
pub fn stable_encode(value: &FilterValue) -> String {
    let mut out = String::new();
    write_stable(value, false, &mut out);
    out
}

/// Canonical encoding of a collection: stable, with array elements sorted
///
/// Two collections holding the same elements in a different order encode
/// identically.
pub fn canonical_encode(value: &FilterValue) -> String {
    let mut out = String::new();
    write_stable(value, true, &mut out);
    out
}

fn write_stable(value: &FilterValue, sort_arrays: bool, out: &mut String) {
    match value {
        Value::Array(items) => {
            let mut encoded: Vec<String> = items
                .iter()
                .map(|item| {
                    let mut buf = String::new();
                    write_stable(item, sort_arrays, &mut buf);
                    buf
                })
                .collect();
            if sort_arrays {
                encoded.sort();
            }
            out.push('[');
            out.push_str(&encoded.join(","));
            out.push(']');
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Keys are plain strings; serde_json escapes them for us
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_stable(item, sort_arrays, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Integer view of a value (`5`, `"5"`, `5.0`)
pub fn as_integer(value: &FilterValue) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Numeric view of a value (`5`, `"5.5"`)
pub fn as_number(value: &FilterValue) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Boolean view of a value, accepting the usual request spellings
pub fn as_boolean(value: &FilterValue) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
