//! Value transforms applied before predicate dispatch

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::value::{as_boolean, as_integer, FilterValue};

/// Custom transform closure
pub type TransformFn = Arc<dyn Fn(FilterValue) -> FilterValue + Send + Sync>;

/// A value transform declared for one filter key
///
/// String transforms map over array elements; non-string values pass through.
#[derive(Clone)]
pub enum Transform {
    Trim,
    Lowercase,
    Uppercase,
    /// Split a string into an array, trimming parts and dropping empty ones
    Split(String),
    /// Coerce to an integer, leaving unparseable values untouched
    ToInteger,
    /// Coerce request spellings (`"1"`, `"yes"`, `"off"`) to booleans
    ToBoolean,
    Custom(TransformFn),
}

impl Transform {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(FilterValue) -> FilterValue + Send + Sync + 'static,
    {
        Transform::Custom(Arc::new(f))
    }

    pub fn apply(&self, value: FilterValue) -> FilterValue {
        match self {
            Transform::Trim => map_strings(value, |s| s.trim().to_string()),
            Transform::Lowercase => map_strings(value, |s| s.to_lowercase()),
            Transform::Uppercase => map_strings(value, |s| s.to_uppercase()),
            Transform::Split(separator) => match value {
                Value::String(s) => Value::Array(
                    s.split(separator.as_str())
                        .map(str::trim)
                        .filter(|part| !part.is_empty())
                        .map(|part| Value::String(part.to_string()))
                        .collect(),
                ),
                other => other,
            },
            Transform::ToInteger => map_scalars(value, |v| match as_integer(&v) {
                Some(n) => Value::from(n),
                None => v,
            }),
            Transform::ToBoolean => map_scalars(value, |v| match as_boolean(&v) {
                Some(b) => Value::Bool(b),
                None => v,
            }),
            Transform::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Trim => f.write_str("Trim"),
            Transform::Lowercase => f.write_str("Lowercase"),
            Transform::Uppercase => f.write_str("Uppercase"),
            Transform::Split(sep) => write!(f, "Split({:?})", sep),
            Transform::ToInteger => f.write_str("ToInteger"),
            Transform::ToBoolean => f.write_str("ToBoolean"),
            Transform::Custom(_) => f.write_str("Custom"),
        }
    }
}

fn map_strings(value: FilterValue, f: impl Fn(&str) -> String + Copy) -> FilterValue {
    match value {
        Value::String(s) => Value::String(f(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| map_strings(v, f)).collect()),
        other => other,
    }
}

fn map_scalars(value: FilterValue, f: impl Fn(FilterValue) -> FilterValue + Copy) -> FilterValue {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(f).collect()),
        other => f(other),
    }
}

/// Run a pipeline of transforms in declaration order
pub fn apply_all(transforms: &[Transform], value: FilterValue) -> FilterValue {
    transforms.iter().fold(value, |acc, t| t.apply(acc))
}
