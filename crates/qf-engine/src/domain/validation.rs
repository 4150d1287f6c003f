//! Input validation rules
//!
//! Rules are declared per filter key on the definition. Every failing rule is
//! collected so callers can report all problems at once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::value::{as_boolean, as_integer, as_number, collection_len, FilterValue, Filterables};

/// Custom check: `Err(message)` on failure
pub type CustomCheck = Arc<dyn Fn(&FilterValue) -> Result<(), String> + Send + Sync>;

/// A declarative validation rule for one filter key
#[derive(Clone)]
pub enum Rule {
    /// Key must be present and non-absent
    Required,
    String,
    Integer,
    Numeric,
    Boolean,
    Array,
    /// Minimum length for strings and collections
    MinLength(usize),
    /// Maximum length for strings and collections
    MaxLength(usize),
    /// Minimum numeric value
    Min(f64),
    /// Maximum numeric value
    Max(f64),
    /// Value (or every element of a collection) must be one of these
    In(Vec<String>),
    Custom { name: String, check: CustomCheck },
}

impl Rule {
    /// Custom rule from a closure
    pub fn custom<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&FilterValue) -> Result<(), String> + Send + Sync + 'static,
    {
        Rule::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Allowed-values rule from anything string-like
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Rule::In(values.into_iter().map(Into::into).collect())
    }

    pub fn name(&self) -> &str {
        match self {
            Rule::Required => "required",
            Rule::String => "string",
            Rule::Integer => "integer",
            Rule::Numeric => "numeric",
            Rule::Boolean => "boolean",
            Rule::Array => "array",
            Rule::MinLength(_) => "min_length",
            Rule::MaxLength(_) => "max_length",
            Rule::Min(_) => "min",
            Rule::Max(_) => "max",
            Rule::In(_) => "in",
            Rule::Custom { name, .. } => name,
        }
    }

    /// Check one present value; `Required` is handled by the caller
    fn check(&self, key: &str, value: &FilterValue) -> Result<(), String> {
        match self {
            Rule::Required => Ok(()),
            Rule::String => value
                .as_str()
                .map(|_| ())
                .ok_or_else(|| format!("The {} field must be a string.", key)),
            Rule::Integer => as_integer(value)
                .map(|_| ())
                .ok_or_else(|| format!("The {} field must be an integer.", key)),
            Rule::Numeric => as_number(value)
                .map(|_| ())
                .ok_or_else(|| format!("The {} field must be a number.", key)),
            Rule::Boolean => as_boolean(value)
                .map(|_| ())
                .ok_or_else(|| format!("The {} field must be true or false.", key)),
            Rule::Array => value
                .as_array()
                .map(|_| ())
                .ok_or_else(|| format!("The {} field must be an array.", key)),
            Rule::MinLength(min) => match length_of(value) {
                Some(len) if len < *min => Err(format!(
                    "The {} field must be at least {} long.",
                    key, min
                )),
                _ => Ok(()),
            },
            Rule::MaxLength(max) => match length_of(value) {
                Some(len) if len > *max => Err(format!(
                    "The {} field must not be longer than {}.",
                    key, max
                )),
                _ => Ok(()),
            },
            Rule::Min(min) => match as_number(value) {
                Some(n) if n < *min => Err(format!("The {} field must be at least {}.", key, min)),
                Some(_) => Ok(()),
                None => Err(format!("The {} field must be a number.", key)),
            },
            Rule::Max(max) => match as_number(value) {
                Some(n) if n > *max => {
                    Err(format!("The {} field must not be greater than {}.", key, max))
                }
                Some(_) => Ok(()),
                None => Err(format!("The {} field must be a number.", key)),
            },
            Rule::In(allowed) => {
                let candidates: Vec<&FilterValue> = match value.as_array() {
                    Some(items) => items.iter().collect(),
                    None => vec![value],
                };
                let all_allowed = candidates.iter().all(|candidate| {
                    let text = match candidate {
                        FilterValue::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    allowed.iter().any(|a| *a == text)
                });
                if all_allowed {
                    Ok(())
                } else {
                    Err(format!("The selected {} is invalid.", key))
                }
            }
            Rule::Custom { check, .. } => check(value),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::MinLength(n) => write!(f, "MinLength({})", n),
            Rule::MaxLength(n) => write!(f, "MaxLength({})", n),
            Rule::Min(n) => write!(f, "Min({})", n),
            Rule::Max(n) => write!(f, "Max({})", n),
            Rule::In(values) => write!(f, "In({:?})", values),
            other => write!(f, "{}", other.name()),
        }
    }
}

fn length_of(value: &FilterValue) -> Option<usize> {
    match value {
        FilterValue::String(s) => Some(s.chars().count()),
        other => collection_len(other),
    }
}

/// Validation failures keyed by filter key
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(key.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// Messages for one key
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.errors.get(key).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self
            .errors
            .values()
            .flat_map(|m| m.iter().map(String::as_str))
            .collect();
        f.write_str(&messages.join(" "))
    }
}

/// Run declared rules against the active filterables
pub fn validate_rules(
    rules: &BTreeMap<String, Vec<Rule>>,
    filterables: &Filterables,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for (key, key_rules) in rules {
        match filterables.get(key) {
            None => {
                if key_rules.iter().any(|r| matches!(r, Rule::Required)) {
                    errors.add(key, format!("The {} field is required.", key));
                }
            }
            Some(value) => {
                for rule in key_rules {
                    if let Err(message) = rule.check(key, value) {
                        errors.add(key, message);
                    }
                }
            }
        }
    }

    errors.into_result()
}
