//! Filterable resolution and predicate-method naming

use std::collections::{BTreeMap, BTreeSet};

use super::value::{is_absent, Filterables};

/// Keys to read from the input source: declared keys plus override-map keys
pub fn filterable_keys<'a, I>(declared: I, method_map: &'a BTreeMap<String, String>) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    declared
        .into_iter()
        .chain(method_map.keys())
        .cloned()
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

/// Merge source values with programmatically appended values
///
/// Absent values are dropped from both sides. Appended values take precedence
/// over source values for the same key.
pub fn resolve(source: Filterables, appended: &Filterables) -> Filterables {
    let mut active: Filterables = source
        .into_iter()
        .filter(|(_, value)| !is_absent(value))
        .collect();

    for (key, value) in appended {
        if !is_absent(value) {
            active.insert(key.clone(), value.clone());
        }
    }
    active
}

/// Method name for a key: explicit override, else the camel-case convention
pub fn method_name_for(key: &str, method_map: &BTreeMap<String, String>) -> String {
    method_map
        .get(key)
        .cloned()
        .unwrap_or_else(|| camel_case(key))
}

/// `created_at` → `createdAt`, `min-price` → `minPrice`, `Status` → `status`
pub fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;

    for c in key.chars() {
        if c == '_' || c == '-' || c == ' ' || c == '.' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else if out.is_empty() {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
