//! Simple acting-principal value

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::value::FilterValue;
use crate::ports::outbound::Principal;

/// An authenticated actor with a flat permission set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: FilterValue,
    #[serde(default = "default_identifier_name")]
    pub identifier_name: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

fn default_identifier_name() -> String {
    "id".to_string()
}

impl Actor {
    pub fn new(id: impl Into<FilterValue>) -> Self {
        Self {
            id: id.into(),
            identifier_name: default_identifier_name(),
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn with_identifier_name(mut self, name: impl Into<String>) -> Self {
        self.identifier_name = name.into();
        self
    }
}

impl Principal for Actor {
    fn identifier_name(&self) -> &str {
        &self.identifier_name
    }

    fn identifier(&self) -> FilterValue {
        self.id.clone()
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}
