//! The composable query abstraction evaluators build against.
//!
//! A [`Queryable`] is a lazy description of a query over an entity set. The
//! store-backed pipeline never materializes anything: each stage hands back a
//! further-composed queryable, and the store decides when and how to run it.

use std::fmt;

use crate::specification::{CachePolicy, TrackingMode};
use crate::terms::{IncludePath, OrderTerm, Predicate, Projector, SearchTerm, Selector};
use crate::value::Entity;

/// A lazily composed query over `T`.
///
/// Every method consumes the query and returns the composed one. Terms the
/// implementation cannot translate are recorded and reported when the query
/// is materialized, not here.
pub trait Queryable<T: Entity>: Sized {
    /// Narrows the set by `predicate`. Repeated calls are ANDed.
    fn filter(self, predicate: Predicate<T>) -> Self;

    /// Applies one batch of search terms (grouped by their group number).
    fn search(self, terms: Vec<SearchTerm<T>>) -> Self;

    /// Eager-loads one navigation path.
    fn include(self, path: IncludePath) -> Self;

    /// Adds an ordering key. A primary term replaces any existing ordering;
    /// a `ThenBy*` term appends a tie-breaker.
    fn order_by(self, term: OrderTerm<T>) -> Self;

    /// Skips `n` rows of the current sequence.
    fn skip(self, n: usize) -> Self;

    /// Keeps at most `n` rows of the current sequence.
    fn take(self, n: usize) -> Self;

    fn with_tracking(self, mode: TrackingMode) -> Self;

    fn split_query(self) -> Self;

    /// Bypasses the store's global filters for this entity.
    fn ignore_query_filters(self) -> Self;

    /// Regroups the result so rows sharing a key are contiguous.
    fn group_by(self, selector: Selector<T>) -> Self;

    fn cacheable(self, policy: CachePolicy) -> Self;
}

/// A queryable paired with the projection applied after it materializes.
pub struct ProjectedQuery<Q, T, R> {
    source: Q,
    projector: Projector<T, R>,
    members_to_expand: Vec<String>,
}

impl<Q, T, R> ProjectedQuery<Q, T, R> {
    pub(crate) fn new(source: Q, projector: Projector<T, R>, members_to_expand: Vec<String>) -> Self {
        Self {
            source,
            projector,
            members_to_expand,
        }
    }

    /// The underlying entity query.
    pub fn source(&self) -> &Q {
        &self.source
    }

    pub fn members_to_expand(&self) -> &[String] {
        &self.members_to_expand
    }

    /// Maps one materialized entity.
    pub fn project_one(&self, item: &T) -> R {
        (self.projector)(item)
    }

    /// Maps a materialized sequence, preserving order.
    pub fn project(&self, items: &[T]) -> Vec<R> {
        items.iter().map(|item| (self.projector)(item)).collect()
    }

    pub fn into_parts(self) -> (Q, Projector<T, R>, Vec<String>) {
        (self.source, self.projector, self.members_to_expand)
    }
}

impl<Q: fmt::Debug, T, R> fmt::Debug for ProjectedQuery<Q, T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectedQuery")
            .field("source", &self.source)
            .field("members_to_expand", &self.members_to_expand)
            .finish_non_exhaustive()
    }
}
