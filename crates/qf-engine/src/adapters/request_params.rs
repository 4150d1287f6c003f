//! Request parameter input source
//!
//! Accepts a JSON object or a URL query string. Repeated keys and `key[]`
//! suffixes collect into arrays: `tags[]=a&tags[]=b` → `{"tags": ["a", "b"]}`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::domain::value::{FilterValue, Filterables};
use crate::error::FilterError;
use crate::ports::outbound::InputSource;

/// Read-only request parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    params: BTreeMap<String, FilterValue>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters from a JSON object
    pub fn from_json(value: Value) -> Result<Self, FilterError> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(FilterError::InvalidInput(format!(
                "request parameters must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            params: map.into_iter().collect(),
        }
    }

    /// Parameters from a URL query string (leading `?` allowed)
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params: BTreeMap<String, FilterValue> = BTreeMap::new();

        for (raw_key, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = Value::String(value.into_owned());
            match raw_key.strip_suffix("[]") {
                Some(key) => push_value(&mut params, key, value, true),
                None => push_value(&mut params, &raw_key, value, false),
            }
        }
        Self { params }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.params.get(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

fn push_value(params: &mut BTreeMap<String, FilterValue>, key: &str, value: Value, as_array: bool) {
    match params.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            // Repeated scalar key becomes an array
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            let value = if as_array {
                Value::Array(vec![value])
            } else {
                value
            };
            params.insert(key.to_string(), value);
        }
    }
}

impl InputSource for RequestParams {
    fn only(&self, keys: &[String]) -> Filterables {
        keys.iter()
            .filter_map(|key| self.params.get(key).map(|v| (key.clone(), v.clone())))
            .collect()
    }
}

impl InputSource for Filterables {
    fn only(&self, keys: &[String]) -> Filterables {
        keys.iter()
            .filter_map(|key| self.get(key).map(|v| (key.clone(), v.clone())))
            .collect()
    }
}

impl From<Filterables> for RequestParams {
    fn from(params: Filterables) -> Self {
        Self { params }
    }
}
