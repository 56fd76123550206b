//! GroupBy stage.

use crate::queryable::Queryable;
use crate::specification::Specification;
use crate::value::Entity;

pub(crate) fn apply<T: Entity, Q: Queryable<T>>(query: Q, spec: &Specification<T>) -> Q {
    match spec.group_by() {
        Some(selector) => query.group_by(selector.clone()),
        None => query,
    }
}
