//! Where stage: ANDs every where term into the query.

use crate::queryable::Queryable;
use crate::specification::Specification;
use crate::value::Entity;

pub(crate) fn apply<T: Entity, Q: Queryable<T>>(mut query: Q, spec: &Specification<T>) -> Q {
    if spec.ignore_query_filters() {
        query = query.ignore_query_filters();
    }
    for predicate in spec.where_terms() {
        query = query.filter(predicate.clone());
    }
    query
}
