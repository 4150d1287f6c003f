//! Error types for the filter engine
//!
//! Programmer-contract violations (`Reapplication`, `NotApplied`,
//! `BadDispatch`) are always returned immediately. Domain failures raised while
//! the pipeline runs are captured into the `failed` state and surface later as
//! `Failed` when results are requested. Validation errors do both: the instance
//! moves to `failed` and the error is returned to the caller unchanged.

use std::fmt;

use thiserror::Error;

use crate::domain::config::ConfigError;
use crate::domain::state::FilterState;
use crate::domain::validation::ValidationErrors;

/// Errors that can occur while defining, applying or executing a filter
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Filter already applied (state: {state}); call reset() before applying again")]
    Reapplication { state: FilterState },

    #[error("Filter has not been applied yet")]
    NotApplied,

    #[error("No predicate for filter key '{key}': missing method '{method}'")]
    BadDispatch { key: String, method: String },

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Predicate failure: {0}")]
    Predicate(String),

    #[error("Filter application failed: {reason}")]
    Failed { reason: String },

    #[error("Invalid filter input: {0}")]
    InvalidInput(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: FilterState, to: FilterState },

    #[error("Feature set cannot change while the filter is applying")]
    FeaturesLocked,

    #[error("No query attached to the filter")]
    MissingQuery,

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl FilterError {
    /// Build a predicate failure from any message
    pub fn predicate(message: impl Into<String>) -> Self {
        Self::Predicate(message.into())
    }

    /// Contract violations are raised immediately and never folded into `failed`
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::Reapplication { .. } | Self::NotApplied | Self::BadDispatch { .. }
        )
    }

    /// Errors that escape the pipeline instead of being captured
    pub(crate) fn propagates_from_pipeline(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::BadDispatch { .. })
    }
}

/// Errors from the query representation collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Invalid operand for {operator}: {detail}")]
    InvalidOperand { operator: String, detail: String },

    #[error("Execution error: {0}")]
    Execution(String),
}

/// Result type alias for engine operations
pub type FilterResult<T> = Result<T, FilterError>;

/// Helper so failure reasons read the same in logs and in `Failed`
pub(crate) struct Reason<'a>(pub &'a FilterError);

impl fmt::Display for Reason<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            // Unwrap one level so get() reports the original predicate message
            FilterError::Predicate(message) => f.write_str(message),
            other => write!(f, "{}", other),
        }
    }
}
