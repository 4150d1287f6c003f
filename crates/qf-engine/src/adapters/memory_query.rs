//! In-memory [`QueryBuilder`] over JSON rows
//!
//! Evaluates predicates against `serde_json` objects held in memory. Used by
//! the test suite and as a reference for adapters over real query builders.
//!
//! Comparison rules:
//! - when both sides read as numbers (`30`, `"30"`), compare numerically
//! - otherwise compare the string forms
//! - a missing column reads as `null`, which only equals `null`
//! - `like` supports `%` and `_` wildcards and ignores ASCII case

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::domain::query::{Direction, Operator, PredicateKind, QueryShape};
use crate::domain::value::{as_number, scalar_string, FilterValue};
use crate::error::QueryError;
use crate::ports::outbound::QueryBuilder;

/// Custom row test
pub type RowFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Clone)]
enum Predicate {
    Compare {
        column: String,
        operator: Operator,
        value: FilterValue,
    },
    In {
        column: String,
        values: Vec<FilterValue>,
    },
    Between {
        column: String,
        low: FilterValue,
        high: FilterValue,
    },
    Custom {
        description: String,
        test: RowFn,
    },
}

impl Predicate {
    fn matches(&self, row: &Value) -> bool {
        match self {
            Predicate::Compare {
                column,
                operator,
                value,
            } => compare(column_value(row, column), *operator, value),
            Predicate::In { column, values } => {
                let actual = column_value(row, column);
                values.iter().any(|v| values_equal(actual, v))
            }
            Predicate::Between { column, low, high } => {
                let actual = column_value(row, column);
                matches!(
                    order_values(actual, low),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(
                    order_values(actual, high),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
            Predicate::Custom { test, .. } => test(row),
        }
    }

    fn kind(&self) -> PredicateKind {
        match self {
            Predicate::Compare {
                column, operator, ..
            } => PredicateKind::Comparison {
                column: column.clone(),
                operator: *operator,
            },
            Predicate::In { column, values } => PredicateKind::In {
                column: column.clone(),
                len: values.len(),
            },
            Predicate::Between { column, .. } => PredicateKind::Between {
                column: column.clone(),
            },
            Predicate::Custom { description, .. } => PredicateKind::Other {
                description: description.clone(),
            },
        }
    }
}

/// Query over an in-memory table of JSON objects
#[derive(Clone)]
pub struct InMemoryQuery {
    table: String,
    rows: Arc<Vec<Value>>,
    schema: Option<BTreeSet<String>>,
    predicates: Vec<Predicate>,
    joins: usize,
    orderings: Vec<(String, Direction)>,
    columns: Option<Vec<String>>,
    relations: Vec<String>,
    index_hint: Option<String>,
    executions: Arc<AtomicU64>,
}

impl InMemoryQuery {
    /// Query over `rows` in storage order
    pub fn new(table: impl Into<String>, rows: Vec<Value>) -> Self {
        Self::from_shared(table, Arc::new(rows))
    }

    /// Query over rows shared with other queries
    pub fn from_shared(table: impl Into<String>, rows: Arc<Vec<Value>>) -> Self {
        Self {
            table: table.into(),
            rows,
            schema: None,
            predicates: Vec::new(),
            joins: 0,
            orderings: Vec::new(),
            columns: None,
            relations: Vec::new(),
            index_hint: None,
            executions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Reject references to columns outside `columns`
    pub fn with_schema<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schema = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Inner join: rows pair up where `local` equals `other.foreign`
    ///
    /// Joined columns are exposed as `"{table}.{column}"`.
    pub fn join(
        &mut self,
        other: &InMemoryQuery,
        local: &str,
        foreign: &str,
    ) -> Result<(), QueryError> {
        self.check_column(local)?;
        let right_rows = other.execute_all();
        let mut joined = Vec::new();

        for left in self.execute_unprojected() {
            for right in &right_rows {
                if !values_equal(column_value(&left, local), column_value(right, foreign)) {
                    continue;
                }
                let mut merged = left.as_object().cloned().unwrap_or_default();
                if let Some(fields) = right.as_object() {
                    for (name, value) in fields {
                        merged.insert(format!("{}.{}", other.table, name), value.clone());
                    }
                }
                joined.push(Value::Object(merged));
            }
        }

        if let Some(schema) = self.schema.as_mut() {
            if let Some(first) = right_rows.first().and_then(Value::as_object) {
                for name in first.keys() {
                    schema.insert(format!("{}.{}", other.table, name));
                }
            }
        }
        // Existing predicates and orderings are folded into the joined rows
        self.rows = Arc::new(joined);
        self.predicates.clear();
        self.orderings.clear();
        self.joins += 1;
        Ok(())
    }

    /// Arbitrary row predicate, reported as `Other` in the shape
    pub fn where_fn<F>(&mut self, description: impl Into<String>, test: F)
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Predicate::Custom {
            description: description.into(),
            test: Arc::new(test),
        });
    }

    /// How many times the query has been executed
    pub fn executions(&self) -> u64 {
        self.executions.load(AtomicOrdering::Relaxed)
    }

    fn check_column(&self, column: &str) -> Result<(), QueryError> {
        match &self.schema {
            Some(schema) if !schema.contains(column) => {
                Err(QueryError::UnknownColumn(column.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn execute_unprojected(&self) -> Vec<Value> {
        let mut matched: Vec<Value> = self
            .rows
            .iter()
            .filter(|row| self.predicates.iter().all(|p| p.matches(row)))
            .cloned()
            .collect();

        if !self.orderings.is_empty() {
            // Stable: ties keep storage order
            matched.sort_by(|a, b| {
                for (column, direction) in &self.orderings {
                    let ordering = order_values(column_value(a, column), column_value(b, column))
                        .unwrap_or(Ordering::Equal);
                    let ordering = match direction {
                        Direction::Asc => ordering,
                        Direction::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        matched
    }

    fn execute_all(&self) -> Vec<Value> {
        self.executions.fetch_add(1, AtomicOrdering::Relaxed);
        let rows = self.execute_unprojected();
        match &self.columns {
            Some(columns) => rows.into_iter().map(|row| project(row, columns)).collect(),
            None => rows,
        }
    }
}

impl fmt::Debug for InMemoryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryQuery")
            .field("table", &self.table)
            .field("rows", &self.rows.len())
            .field("shape", &self.shape())
            .finish()
    }
}

impl QueryBuilder for InMemoryQuery {
    type Row = Value;

    fn where_op(
        &mut self,
        column: &str,
        operator: Operator,
        value: &FilterValue,
    ) -> Result<(), QueryError> {
        self.check_column(column)?;
        if operator == Operator::Like && !value.is_string() {
            return Err(QueryError::InvalidOperand {
                operator: operator.to_string(),
                detail: format!("pattern must be a string, got {}", value),
            });
        }
        self.predicates.push(Predicate::Compare {
            column: column.to_string(),
            operator,
            value: value.clone(),
        });
        Ok(())
    }

    fn where_in(&mut self, column: &str, values: &[FilterValue]) -> Result<(), QueryError> {
        self.check_column(column)?;
        self.predicates.push(Predicate::In {
            column: column.to_string(),
            values: values.to_vec(),
        });
        Ok(())
    }

    fn where_between(
        &mut self,
        column: &str,
        low: &FilterValue,
        high: &FilterValue,
    ) -> Result<(), QueryError> {
        self.check_column(column)?;
        self.predicates.push(Predicate::Between {
            column: column.to_string(),
            low: low.clone(),
            high: high.clone(),
        });
        Ok(())
    }

    fn order_by(&mut self, column: &str, direction: Direction) -> Result<(), QueryError> {
        self.check_column(column)?;
        self.orderings.push((column.to_string(), direction));
        Ok(())
    }

    fn select(&mut self, columns: &[String]) -> Result<(), QueryError> {
        for column in columns {
            self.check_column(column)?;
        }
        self.columns = Some(columns.to_vec());
        Ok(())
    }

    fn with_relations(&mut self, relations: &[String]) -> Result<(), QueryError> {
        for relation in relations {
            if !self.relations.contains(relation) {
                self.relations.push(relation.clone());
            }
        }
        Ok(())
    }

    fn use_index(&mut self, index: &str) -> Result<(), QueryError> {
        self.index_hint = Some(index.to_string());
        Ok(())
    }

    fn shape(&self) -> QueryShape {
        QueryShape {
            predicates: self.predicates.iter().map(Predicate::kind).collect(),
            joins: self.joins,
            orderings: self.orderings.len(),
            columns: self.columns.clone(),
            relations: self.relations.clone(),
            index_hint: self.index_hint.clone(),
        }
    }

    fn get(&self) -> Result<Vec<Value>, QueryError> {
        Ok(self.execute_all())
    }

    fn count(&self) -> Result<u64, QueryError> {
        self.executions.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(self.execute_unprojected().len() as u64)
    }

    fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Value>, QueryError> {
        Ok(self
            .execute_all()
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }
}

static NULL: Value = Value::Null;

fn column_value<'a>(row: &'a Value, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&NULL)
}

fn project(row: Value, columns: &[String]) -> Value {
    match row {
        Value::Object(mut fields) => {
            let mut projected = Map::new();
            for column in columns {
                if let Some(value) = fields.remove(column) {
                    projected.insert(column.clone(), value);
                }
            }
            Value::Object(projected)
        }
        other => other,
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => order_values(actual, expected) == Some(Ordering::Equal),
    }
}

/// Order two scalars, numerically when both read as numbers
fn order_values(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (scalar_string(a), scalar_string(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => None,
    }
}

fn compare(actual: &Value, operator: Operator, expected: &Value) -> bool {
    match operator {
        Operator::Eq => values_equal(actual, expected),
        Operator::NotEq => !actual.is_null() && !values_equal(actual, expected),
        Operator::Lt => order_values(actual, expected) == Some(Ordering::Less),
        Operator::Lte => matches!(
            order_values(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => order_values(actual, expected) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            order_values(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Like => match (scalar_string(actual), expected.as_str()) {
            (Some(text), Some(pattern)) => like(&text, pattern),
            _ => false,
        },
    }
}

/// SQL `LIKE` with `%` and `_`, ASCII case-insensitive
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();

    // dp[j]: pattern[..j] matches text[..i]
    let mut dp = vec![false; pattern.len() + 1];
    dp[0] = true;
    for j in 1..=pattern.len() {
        dp[j] = dp[j - 1] && pattern[j - 1] == '%';
    }
    for c in &text {
        let mut prev_diag = dp[0];
        dp[0] = false;
        for j in 1..=pattern.len() {
            let prev_row = dp[j];
            dp[j] = match pattern[j - 1] {
                '%' => dp[j - 1] || prev_row,
                '_' => prev_diag,
                p => prev_diag && p == *c,
            };
            prev_diag = prev_row;
        }
    }
    dp[pattern.len()]
}
