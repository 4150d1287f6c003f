//! Strategy ports
//!
//! Each optional pipeline behavior is a narrow strategy the orchestrator
//! composes. Default implementations live in `service`; embedders swap any of
//! them through the filter builder.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::domain::query::QueryShape;
use crate::domain::transform::Transform;
use crate::domain::validation::{Rule, ValidationErrors};
use crate::domain::value::Filterables;
use crate::ports::outbound::Principal;

/// Validates active filterables against declared rules
pub trait Validator: Send + Sync {
    fn validate(
        &self,
        rules: &BTreeMap<String, Vec<Rule>>,
        filterables: &Filterables,
    ) -> Result<(), ValidationErrors>;
}

/// Removes filterables the principal may not use
pub trait PermissionPolicy: Send + Sync {
    /// Returns the removed keys
    fn restrict(
        &self,
        filterables: &mut Filterables,
        required: &BTreeMap<String, String>,
        principal: Option<&dyn Principal>,
    ) -> Vec<String>;
}

/// Rewrites filterable values before dispatch
pub trait ValueTransformer: Send + Sync {
    fn transform(&self, transforms: &BTreeMap<String, Vec<Transform>>, filterables: &mut Filterables);
}

/// Decides whether a finalized query should go through the cache
pub trait CachePolicy: Send + Sync {
    fn should_cache(&self, shape: &QueryShape) -> bool;
}

/// Input to a rate-limit check
#[derive(Debug, Clone)]
pub struct RateLimitRequest<'a> {
    /// Filter type name
    pub filter_type: &'a str,
    /// Caller identity (IP, API key, ...)
    pub caller: &'a str,
    /// Acting principal identifier, if any
    pub principal: Option<String>,
    pub filterables: &'a Filterables,
    /// Definition weights; configuration weights override these
    pub weights: &'a HashMap<String, u32>,
}

/// Why a request failed a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum Rejection {
    /// More active filterables than allowed
    TooManyFilters { count: usize, max: usize },
    /// Complexity score above the maximum
    TooComplex { score: u32, max: u32 },
    /// Too many attempts in the current window
    Throttled { attempts: u32, max: u32 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooManyFilters { count, max } => {
                write!(f, "too many filters: {} (max {})", count, max)
            }
            Rejection::TooComplex { score, max } => {
                write!(f, "filter complexity {} exceeds {}", score, max)
            }
            Rejection::Throttled { attempts, max } => {
                write!(f, "too many attempts: {} (max {})", attempts, max)
            }
        }
    }
}

/// Outcome of a rate-limit check
///
/// Advisory: the orchestrator records it and keeps dispatching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitVerdict {
    pub allowed: bool,
    pub rejection: Option<Rejection>,
    pub score: u32,
    pub filter_count: usize,
}

impl RateLimitVerdict {
    pub fn allow(score: u32, filter_count: usize) -> Self {
        Self {
            allowed: true,
            rejection: None,
            score,
            filter_count,
        }
    }

    pub fn reject(rejection: Rejection, score: u32, filter_count: usize) -> Self {
        Self {
            allowed: false,
            rejection: Some(rejection),
            score,
            filter_count,
        }
    }
}

/// Complexity-scored rate limiter
pub trait RateLimiter: Send + Sync {
    fn check(&self, request: &RateLimitRequest<'_>) -> RateLimitVerdict;
}
