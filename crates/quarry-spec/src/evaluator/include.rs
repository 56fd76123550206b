//! Include stage: one call per reconstructed navigation path.

use crate::queryable::Queryable;
use crate::specification::Specification;
use crate::value::Entity;

pub(crate) fn apply<T: Entity, Q: Queryable<T>>(query: Q, spec: &Specification<T>) -> Q {
    spec.include_paths()
        .into_iter()
        .fold(query, |query, path| query.include(path))
}
