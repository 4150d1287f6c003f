//! Default strategy implementations

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::cache_key::SmartCachePolicy;
use crate::domain::query::QueryShape;
use crate::domain::transform::{apply_all, Transform};
use crate::domain::validation::{validate_rules, Rule, ValidationErrors};
use crate::domain::value::{is_absent, FilterValue, Filterables};
use crate::ports::outbound::Principal;
use crate::ports::strategy::{CachePolicy, PermissionPolicy, ValueTransformer, Validator};

/// Validates against the definition's declared rules
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    fn validate(
        &self,
        rules: &BTreeMap<String, Vec<Rule>>,
        filterables: &Filterables,
    ) -> Result<(), ValidationErrors> {
        validate_rules(rules, filterables)
    }
}

/// Removes keys whose required permission the principal lacks
///
/// Without a principal every restricted key is removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredPermissions;

impl PermissionPolicy for DeclaredPermissions {
    fn restrict(
        &self,
        filterables: &mut Filterables,
        required: &BTreeMap<String, String>,
        principal: Option<&dyn Principal>,
    ) -> Vec<String> {
        let mut removed = Vec::new();
        for (key, permission) in required {
            if !filterables.contains_key(key) {
                continue;
            }
            let allowed = principal.is_some_and(|p| p.has_permission(permission));
            if !allowed {
                filterables.remove(key);
                removed.push(key.clone());
            }
        }
        removed
    }
}

/// Applies the definition's declared transforms
///
/// A value that transforms into `null`, `""` or an empty collection is
/// dropped. A coerced `false` is a real filter value and stays.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredTransforms;

impl ValueTransformer for DeclaredTransforms {
    fn transform(&self, transforms: &BTreeMap<String, Vec<Transform>>, filterables: &mut Filterables) {
        for (key, pipeline) in transforms {
            if let Some(value) = filterables.remove(key) {
                let transformed = apply_all(pipeline, value);
                if !vanished(&transformed) {
                    filterables.insert(key.clone(), transformed);
                }
            }
        }
    }
}

fn vanished(value: &FilterValue) -> bool {
    !matches!(value, Value::Bool(false)) && is_absent(value)
}

impl CachePolicy for SmartCachePolicy {
    fn should_cache(&self, shape: &QueryShape) -> bool {
        SmartCachePolicy::should_cache(self, shape)
    }
}

/// Cache every query regardless of shape
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCache;

impl CachePolicy for AlwaysCache {
    fn should_cache(&self, _shape: &QueryShape) -> bool {
        true
    }
}
