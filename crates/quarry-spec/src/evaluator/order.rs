//! Order stage.

use crate::queryable::Queryable;
use crate::specification::Specification;
use crate::value::Entity;

/// Applies order terms in declaration order. The builder guarantees the
/// primary term comes first, so later terms only break ties.
pub(crate) fn apply<T: Entity, Q: Queryable<T>>(query: Q, spec: &Specification<T>) -> Q {
    spec.order_terms()
        .iter()
        .fold(query, |query, term| query.order_by(term.clone()))
}
