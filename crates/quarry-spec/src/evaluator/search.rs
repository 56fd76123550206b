//! Search stage.
//!
//! All search terms are handed over in one batch so the store can OR the
//! terms of a group and AND the groups together.

use crate::queryable::Queryable;
use crate::specification::Specification;
use crate::value::Entity;

pub(crate) fn apply<T: Entity, Q: Queryable<T>>(query: Q, spec: &Specification<T>) -> Q {
    if spec.search_terms().is_empty() {
        return query;
    }
    query.search(spec.search_terms().to_vec())
}
