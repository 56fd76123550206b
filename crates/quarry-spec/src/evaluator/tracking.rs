use crate::queryable::Queryable;
use crate::specification::{Specification, TrackingMode};
use crate::value::Entity;

pub(crate) fn apply<T: Entity, Q: Queryable<T>>(query: Q, spec: &Specification<T>) -> Q {
    match spec.tracking_mode() {
        TrackingMode::Tracking => query,
        mode => query.with_tracking(mode),
    }
}
