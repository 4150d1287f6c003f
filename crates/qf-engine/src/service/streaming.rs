//! Memory-bounded execution
//!
//! Rows are pulled from the query one page at a time; at most one chunk is
//! held in memory by the iterator. [`LazyRows`] is restartable: every call to
//! [`LazyRows::iter`] re-issues the paged fetches, so it is only as
//! repeatable as the underlying query. Nothing is cached between passes.

use std::fmt;

use crate::error::FilterResult;
use crate::ports::outbound::QueryBuilder;

/// Smallest allowed chunk size
pub const MIN_CHUNK_SIZE: usize = 1;

/// Restartable lazy sequence over a finalized query
pub struct LazyRows<'q, Q: QueryBuilder> {
    query: &'q Q,
    chunk_size: usize,
}

impl<'q, Q: QueryBuilder> LazyRows<'q, Q> {
    /// `chunk_size` is clamped to at least [`MIN_CHUNK_SIZE`]
    pub fn new(query: &'q Q, chunk_size: usize) -> Self {
        Self {
            query,
            chunk_size: chunk_size.max(MIN_CHUNK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Start a fresh pass over the rows
    pub fn iter(&self) -> LazyIter<'q, Q> {
        LazyIter {
            query: self.query,
            chunk_size: self.chunk_size,
            offset: 0,
            buffer: Vec::new().into_iter(),
            exhausted: false,
        }
    }

    /// Lazily map rows
    pub fn map<U, F>(&self, mut f: F) -> impl Iterator<Item = FilterResult<U>> + 'q
    where
        U: 'q,
        F: FnMut(Q::Row) -> U + 'q,
    {
        self.iter().map(move |row| row.map(&mut f))
    }

    /// Lazily keep rows matching `predicate`
    pub fn filter<F>(&self, mut predicate: F) -> impl Iterator<Item = FilterResult<Q::Row>> + 'q
    where
        F: FnMut(&Q::Row) -> bool + 'q,
    {
        self.iter().filter(move |row| match row {
            Ok(row) => predicate(row),
            Err(_) => true,
        })
    }

    /// Fold every row into an accumulator, stopping at the first error
    pub fn reduce<A, F>(&self, init: A, mut f: F) -> FilterResult<A>
    where
        F: FnMut(A, Q::Row) -> A,
    {
        let mut acc = init;
        for row in self.iter() {
            acc = f(acc, row?);
        }
        Ok(acc)
    }

    /// Visit every row; returns how many were visited
    pub fn for_each<F>(&self, mut f: F) -> FilterResult<usize>
    where
        F: FnMut(Q::Row),
    {
        self.reduce(0usize, |visited, row| {
            f(row);
            visited + 1
        })
    }
}

impl<Q: QueryBuilder> fmt::Debug for LazyRows<'_, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRows")
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

/// One pass over a [`LazyRows`] sequence
///
/// Yields `Err` once if a page fetch fails, then ends.
pub struct LazyIter<'q, Q: QueryBuilder> {
    query: &'q Q,
    chunk_size: usize,
    offset: usize,
    buffer: std::vec::IntoIter<Q::Row>,
    exhausted: bool,
}

impl<Q: QueryBuilder> Iterator for LazyIter<'_, Q> {
    type Item = FilterResult<Q::Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.buffer.next() {
            return Some(Ok(row));
        }
        if self.exhausted {
            return None;
        }

        match self.query.fetch_page(self.offset, self.chunk_size) {
            Ok(page) => {
                if page.len() < self.chunk_size {
                    self.exhausted = true;
                }
                self.offset += page.len();
                self.buffer = page.into_iter();
                self.buffer.next().map(Ok)
            }
            Err(err) => {
                self.exhausted = true;
                Some(Err(err.into()))
            }
        }
    }
}

/// Materialize every row by accumulating fixed-size chunks
pub fn collect_chunked<Q: QueryBuilder>(query: &Q, chunk_size: usize) -> FilterResult<Vec<Q::Row>> {
    let mut rows = Vec::new();
    query.chunk(chunk_size.max(MIN_CHUNK_SIZE), |chunk| {
        rows.extend(chunk);
        true
    })?;
    Ok(rows)
}
