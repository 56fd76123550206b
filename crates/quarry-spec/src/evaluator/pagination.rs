//! Pagination stage. Skip is applied before take.

use crate::queryable::Queryable;
use crate::specification::Specification;
use crate::value::Entity;

pub(crate) fn apply<T: Entity, Q: Queryable<T>>(mut query: Q, spec: &Specification<T>) -> Q {
    if let Some(n) = spec.skip() {
        query = query.skip(n);
    }
    if let Some(n) = spec.take() {
        query = query.take(n);
    }
    query
}
