//! Inbound Ports (Driving Ports)
//!
//! The lifecycle API callers use to drive one filter instance.

use crate::domain::state::FilterState;
use crate::domain::value::Options;
use crate::error::FilterResult;
use crate::ports::outbound::QueryBuilder;

/// Lifecycle API of a filter instance (Driving Port)
///
/// One instance serves one logical request and is not meant to be shared
/// between threads while applying.
pub trait FilterApi<Q: QueryBuilder> {
    /// Run the pipeline against `query`
    ///
    /// Only valid from `initialized`. Returns the (possibly partially) filtered
    /// query; pipeline failures are recorded and surface from [`get`](Self::get).
    fn apply(&mut self, query: Q, options: Options) -> FilterResult<&Q>;

    /// Execute the finalized query
    fn get(&self) -> FilterResult<Vec<Q::Row>>;

    /// Count rows matched by the finalized query
    fn count(&self) -> FilterResult<u64>;

    /// Return to `initialized`, dropping the query and per-apply state
    fn reset(&mut self);

    fn state(&self) -> FilterState;
}
