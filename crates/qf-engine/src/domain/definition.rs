//! Filter definitions
//!
//! A definition is the immutable description of one filter type: its declared
//! keys, the predicate table those keys dispatch to, and the per-key rules,
//! permissions, transforms and weights. It is built once and shared between
//! instances behind an `Arc`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use super::resolver::{camel_case, filterable_keys, method_name_for};
use super::transform::Transform;
use super::validation::Rule;
use super::value::FilterValue;
use crate::error::FilterResult;

/// Applies one filterable to the query
pub type PredicateFn<Q> = Arc<dyn Fn(&mut Q, &FilterValue) -> FilterResult<()> + Send + Sync>;

/// Arbitrary query transformation run before dispatch
pub type PreFilterFn<Q> = Arc<dyn Fn(&mut Q) -> FilterResult<()> + Send + Sync>;

/// Default column used to scope queries to the acting principal
pub const DEFAULT_PRINCIPAL_COLUMN: &str = "user_id";

/// Immutable description of one filter type
pub struct FilterDefinition<Q> {
    name: String,
    declared: Vec<String>,
    method_map: BTreeMap<String, String>,
    predicates: HashMap<String, PredicateFn<Q>>,
    pre_filters: Vec<PreFilterFn<Q>>,
    rules: BTreeMap<String, Vec<Rule>>,
    permissions: BTreeMap<String, String>,
    transforms: BTreeMap<String, Vec<Transform>>,
    weights: HashMap<String, u32>,
    principal_column: String,
    cache_tags: Vec<String>,
}

impl<Q> FilterDefinition<Q> {
    pub fn builder(name: impl Into<String>) -> FilterDefinitionBuilder<Q> {
        FilterDefinitionBuilder::new(name)
    }

    /// Filter type name, used as cache prefix and throttle key segment
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared keys in declaration order
    pub fn declared_keys(&self) -> &[String] {
        &self.declared
    }

    pub fn method_map(&self) -> &BTreeMap<String, String> {
        &self.method_map
    }

    /// Keys read from the input source
    pub fn filterable_keys(&self) -> Vec<String> {
        filterable_keys(&self.declared, &self.method_map)
    }

    pub fn method_name(&self, key: &str) -> String {
        method_name_for(key, &self.method_map)
    }

    pub fn predicate(&self, method: &str) -> Option<&PredicateFn<Q>> {
        self.predicates.get(method)
    }

    pub fn pre_filters(&self) -> &[PreFilterFn<Q>] {
        &self.pre_filters
    }

    pub fn rules(&self) -> &BTreeMap<String, Vec<Rule>> {
        &self.rules
    }

    /// Permission required for a key, if any
    pub fn required_permission(&self, key: &str) -> Option<&str> {
        self.permissions.get(key).map(String::as_str)
    }

    pub fn permissions(&self) -> &BTreeMap<String, String> {
        &self.permissions
    }

    pub fn transforms(&self) -> &BTreeMap<String, Vec<Transform>> {
        &self.transforms
    }

    pub fn weights(&self) -> &HashMap<String, u32> {
        &self.weights
    }

    pub fn principal_column(&self) -> &str {
        &self.principal_column
    }

    pub fn cache_tags(&self) -> &[String] {
        &self.cache_tags
    }

    /// Filterable keys whose method has no registered predicate
    ///
    /// Dispatching any of these raises `BadDispatch`.
    pub fn missing_predicates(&self) -> Vec<(String, String)> {
        self.filterable_keys()
            .into_iter()
            .filter_map(|key| {
                let method = self.method_name(&key);
                if self.predicates.contains_key(&method) {
                    None
                } else {
                    Some((key, method))
                }
            })
            .collect()
    }
}

impl<Q> fmt::Debug for FilterDefinition<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: BTreeSet<&String> = self.predicates.keys().collect();
        f.debug_struct("FilterDefinition")
            .field("name", &self.name)
            .field("declared", &self.declared)
            .field("method_map", &self.method_map)
            .field("predicates", &methods)
            .field("pre_filters", &self.pre_filters.len())
            .field("rules", &self.rules)
            .field("permissions", &self.permissions)
            .field("transforms", &self.transforms)
            .field("principal_column", &self.principal_column)
            .finish()
    }
}

/// Builder for [`FilterDefinition`]
pub struct FilterDefinitionBuilder<Q> {
    inner: FilterDefinition<Q>,
}

impl<Q> FilterDefinitionBuilder<Q> {
    fn new(name: impl Into<String>) -> Self {
        Self {
            inner: FilterDefinition {
                name: name.into(),
                declared: Vec::new(),
                method_map: BTreeMap::new(),
                predicates: HashMap::new(),
                pre_filters: Vec::new(),
                rules: BTreeMap::new(),
                permissions: BTreeMap::new(),
                transforms: BTreeMap::new(),
                weights: HashMap::new(),
                principal_column: DEFAULT_PRINCIPAL_COLUMN.to_string(),
                cache_tags: Vec::new(),
            },
        }
    }

    /// Declare `key` and register its predicate under the conventional method name
    pub fn filter<F>(self, key: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&mut Q, &FilterValue) -> FilterResult<()> + Send + Sync + 'static,
    {
        let key = key.into();
        let method = camel_case(&key);
        self.declare(key).predicate(method, predicate)
    }

    /// Declare a key without registering a predicate for it
    pub fn declare(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.inner.declared.contains(&key) {
            self.inner.declared.push(key);
        }
        self
    }

    /// Route `key` to an explicitly named method
    pub fn map_method(mut self, key: impl Into<String>, method: impl Into<String>) -> Self {
        self.inner.method_map.insert(key.into(), method.into());
        self
    }

    /// Register a predicate under a method name
    pub fn predicate<F>(mut self, method: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&mut Q, &FilterValue) -> FilterResult<()> + Send + Sync + 'static,
    {
        self.inner
            .predicates
            .insert(method.into(), Arc::new(predicate));
        self
    }

    pub fn pre_filter<F>(mut self, pre_filter: F) -> Self
    where
        F: Fn(&mut Q) -> FilterResult<()> + Send + Sync + 'static,
    {
        self.inner.pre_filters.push(Arc::new(pre_filter));
        self
    }

    pub fn rule(mut self, key: impl Into<String>, rule: Rule) -> Self {
        self.inner.rules.entry(key.into()).or_default().push(rule);
        self
    }

    pub fn rules(mut self, key: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.inner.rules.entry(key.into()).or_default().extend(rules);
        self
    }

    /// Key is removed unless the principal holds `permission`
    pub fn requires_permission(
        mut self,
        key: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        self.inner.permissions.insert(key.into(), permission.into());
        self
    }

    pub fn transform(mut self, key: impl Into<String>, transform: Transform) -> Self {
        self.inner
            .transforms
            .entry(key.into())
            .or_default()
            .push(transform);
        self
    }

    /// Complexity weight for a key
    pub fn weight(mut self, key: impl Into<String>, weight: u32) -> Self {
        self.inner.weights.insert(key.into(), weight);
        self
    }

    /// Column matched against the principal identifier during scoping
    pub fn principal_column(mut self, column: impl Into<String>) -> Self {
        self.inner.principal_column = column.into();
        self
    }

    pub fn cache_tag(mut self, tag: impl Into<String>) -> Self {
        self.inner.cache_tags.push(tag.into());
        self
    }

    pub fn build(self) -> FilterDefinition<Q> {
        self.inner
    }
}
