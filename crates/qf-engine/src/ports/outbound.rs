//! Outbound Ports (Driven Ports)
//!
//! Collaborators the engine drives: the query representation, the input
//! source, the cache store, the rate-limit store, the logger and the acting
//! principal. The engine never performs I/O itself; everything goes through
//! these traits.

use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::domain::query::{Direction, Operator, QueryShape};
use crate::domain::value::{FilterValue, Filterables};
use crate::error::{FilterError, QueryError};

/// Fluent query representation (Driven Port)
///
/// Builder methods mutate the query in place. Execution methods take `&self`
/// and may be called repeatedly; re-issuing them re-runs the query.
pub trait QueryBuilder: Send {
    /// One result row
    type Row: Clone + Send + Serialize + DeserializeOwned + 'static;

    /// `column <operator> value`
    fn where_op(
        &mut self,
        column: &str,
        operator: Operator,
        value: &FilterValue,
    ) -> Result<(), QueryError>;

    /// `column = value`
    fn where_eq(&mut self, column: &str, value: &FilterValue) -> Result<(), QueryError> {
        self.where_op(column, Operator::Eq, value)
    }

    /// `column IN (values)`
    fn where_in(&mut self, column: &str, values: &[FilterValue]) -> Result<(), QueryError>;

    /// `column BETWEEN low AND high` (inclusive)
    fn where_between(
        &mut self,
        column: &str,
        low: &FilterValue,
        high: &FilterValue,
    ) -> Result<(), QueryError>;

    fn order_by(&mut self, column: &str, direction: Direction) -> Result<(), QueryError>;

    /// Restrict the selected columns
    fn select(&mut self, columns: &[String]) -> Result<(), QueryError>;

    /// Eager-load hint
    fn with_relations(&mut self, relations: &[String]) -> Result<(), QueryError>;

    /// Index hint
    fn use_index(&mut self, index: &str) -> Result<(), QueryError>;

    /// Structural summary used by the caching heuristic and debug output
    fn shape(&self) -> QueryShape;

    /// Execute and return every row
    fn get(&self) -> Result<Vec<Self::Row>, QueryError>;

    /// Execute and count matching rows
    fn count(&self) -> Result<u64, QueryError>;

    /// Execute and return at most `limit` rows starting at `offset`
    fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Self::Row>, QueryError>;

    /// Feed rows to `callback` in chunks of `size`
    ///
    /// Stops early and returns `false` when the callback returns `false`.
    fn chunk<F>(&self, size: usize, mut callback: F) -> Result<bool, QueryError>
    where
        F: FnMut(Vec<Self::Row>) -> bool,
        Self: Sized,
    {
        let size = size.max(1);
        let mut offset = 0;
        loop {
            let page = self.fetch_page(offset, size)?;
            let len = page.len();
            if len == 0 {
                return Ok(true);
            }
            if !callback(page) {
                return Ok(false);
            }
            if len < size {
                return Ok(true);
            }
            offset += len;
        }
    }

    /// Single-pass iterator over the result rows
    ///
    /// Pages through [`QueryBuilder::fetch_page`] so at most
    /// [`CURSOR_PAGE_SIZE`] rows are held at once. The first page is fetched
    /// eagerly; a later page failure is logged and ends the iteration.
    fn cursor<'a>(&'a self) -> Result<Box<dyn Iterator<Item = Self::Row> + 'a>, QueryError> {
        let first = self.fetch_page(0, CURSOR_PAGE_SIZE)?;
        Ok(Box::new(PagedCursor::new(self, first, CURSOR_PAGE_SIZE)))
    }
}

/// Rows per page fetched by the default [`QueryBuilder::cursor`]
pub const CURSOR_PAGE_SIZE: usize = 1000;

struct PagedCursor<'a, Q: QueryBuilder + ?Sized> {
    query: &'a Q,
    page_size: usize,
    offset: usize,
    buffer: std::vec::IntoIter<Q::Row>,
    exhausted: bool,
}

impl<'a, Q: QueryBuilder + ?Sized> PagedCursor<'a, Q> {
    fn new(query: &'a Q, first: Vec<Q::Row>, page_size: usize) -> Self {
        Self {
            query,
            page_size,
            offset: first.len(),
            exhausted: first.len() < page_size,
            buffer: first.into_iter(),
        }
    }
}

impl<Q: QueryBuilder + ?Sized> Iterator for PagedCursor<'_, Q> {
    type Item = Q::Row;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.next() {
                return Some(row);
            }
            if self.exhausted {
                return None;
            }
            match self.query.fetch_page(self.offset, self.page_size) {
                Ok(page) => {
                    self.exhausted = page.len() < self.page_size;
                    self.offset += page.len();
                    self.buffer = page.into_iter();
                }
                Err(err) => {
                    tracing::warn!(error = %err, offset = self.offset, "Cursor page fetch failed");
                    self.exhausted = true;
                }
            }
        }
    }
}

/// Read-only request parameters (Driven Port)
pub trait InputSource {
    /// Values for `keys` that are present in the source
    fn only(&self, keys: &[String]) -> Filterables;
}

/// Result of a read-through cache call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Remembered {
    pub value: Bytes,
    /// `true` when served from the store without running the producer
    pub from_cache: bool,
}

/// Producer invoked on a cache miss
pub type Producer<'a> = dyn FnMut() -> Result<Bytes, FilterError> + 'a;

/// Key/value cache store (Driven Port)
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;

    fn put(&self, key: &str, value: Bytes, ttl: Duration, tags: &[String]);

    /// Remove one key, returning whether it existed
    fn forget(&self, key: &str) -> bool;

    /// Whether `flush_tags` is supported
    fn supports_tags(&self) -> bool {
        false
    }

    /// Drop every entry carrying any of `tags`, returning how many were removed
    fn flush_tags(&self, _tags: &[String]) -> usize {
        0
    }

    /// Read-through: return the cached value or run `producer` and store it
    fn remember(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[String],
        producer: &mut Producer<'_>,
    ) -> Result<Remembered, FilterError> {
        if let Some(value) = self.get(key) {
            return Ok(Remembered {
                value,
                from_cache: true,
            });
        }
        let value = producer()?;
        self.put(key, value.clone(), ttl, tags);
        Ok(Remembered {
            value,
            from_cache: false,
        })
    }
}

/// Sliding-window attempt store (Driven Port)
pub trait RateLimitStore: Send + Sync {
    /// Whether `key` already has `max_attempts` live hits within `window`
    fn too_many_attempts(&self, key: &str, max_attempts: u32, window: Duration) -> bool;

    /// Register a hit that stays live for `decay`; returns live hits for `key`
    fn hit(&self, key: &str, decay: Duration) -> u32;

    /// Live hits for `key`
    fn attempts(&self, key: &str) -> u32;

    /// Forget every hit for `key`
    fn clear(&self, key: &str);
}

/// Structured logger (Driven Port)
///
/// The engine only calls this while the `logging` feature is enabled.
pub trait FilterLogger: Send + Sync {
    fn info(&self, message: &str, context: &Value);
    fn debug(&self, message: &str, context: &Value);
    fn warning(&self, message: &str, context: &Value);
}

/// Acting principal (Driven Port)
pub trait Principal: Send + Sync {
    /// Name of the identifier attribute
    fn identifier_name(&self) -> &str {
        "id"
    }

    /// Identifier value used for scoping and key derivation
    fn identifier(&self) -> FilterValue;

    fn has_permission(&self, _permission: &str) -> bool {
        false
    }
}
