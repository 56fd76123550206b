//! Caching stage.
//!
//! Only an explicit choice is forwarded; a specification left at
//! [`CacheMode::Default`] defers to the store's global policy.

use crate::queryable::Queryable;
use crate::specification::{CacheMode, Specification};
use crate::value::Entity;

pub(crate) fn apply<T: Entity, Q: Queryable<T>>(query: Q, spec: &Specification<T>) -> Q {
    match spec.cache_policy().mode {
        CacheMode::Default => query,
        CacheMode::Enabled | CacheMode::Disabled => query.cacheable(spec.cache_policy().clone()),
    }
}
