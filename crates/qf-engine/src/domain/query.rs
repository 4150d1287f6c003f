//! Query vocabulary shared by predicates, adapters and the caching heuristic

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Comparison operators understood by `QueryBuilder::where_op`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "like")]
    Like,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "like",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Ok(Operator::Eq),
            "!=" | "<>" | "ne" => Ok(Operator::NotEq),
            "<" | "lt" => Ok(Operator::Lt),
            "<=" | "lte" => Ok(Operator::Lte),
            ">" | "gt" => Ok(Operator::Gt),
            ">=" | "gte" => Ok(Operator::Gte),
            "like" => Ok(Operator::Like),
            other => Err(format!("unsupported operator: {}", other)),
        }
    }
}

/// Ordering direction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Asc => f.write_str("asc"),
            Direction::Desc => f.write_str("desc"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(format!("unsupported direction: {}", other)),
        }
    }
}

/// Kind of a predicate held by a query, as reported by `QueryBuilder::shape`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateKind {
    /// `column <op> value`
    Comparison { column: String, operator: Operator },
    /// `column IN (...)`
    In { column: String, len: usize },
    /// `column BETWEEN low AND high`
    Between { column: String },
    /// Anything the adapter cannot classify (raw clauses, sub-queries)
    Other { description: String },
}

impl PredicateKind {
    /// Plain comparison with no wildcard matching
    pub fn is_simple_comparison(&self) -> bool {
        matches!(
            self,
            PredicateKind::Comparison { operator, .. } if *operator != Operator::Like
        )
    }
}

/// Structural summary of a finalized query
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryShape {
    /// Predicates in the order they were added
    pub predicates: Vec<PredicateKind>,
    /// Number of joined tables
    pub joins: usize,
    /// Number of ordering clauses
    pub orderings: usize,
    /// Selected columns (`None` = all)
    pub columns: Option<Vec<String>>,
    /// Eager-load hints
    pub relations: Vec<String>,
    /// Index hint, if any
    pub index_hint: Option<String>,
}

impl QueryShape {
    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    pub fn has_join(&self) -> bool {
        self.joins > 0
    }
}
