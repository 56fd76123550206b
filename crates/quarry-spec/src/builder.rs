//! Fluent specification builders.
//!
//! Builders are consuming: every call takes `self` and hands back the builder,
//! so a chain reads top to bottom. Calls that can violate an invariant return
//! `Result<Self>` and fail on the offending call, never later.
//!
//! ```
//! use quarry_spec::{Condition, Specification, SpecError};
//! # use quarry_spec::{Entity, Value};
//! # struct Item { id: i64, disabled: bool }
//! # impl Entity for Item {
//! #     fn field(&self, name: &str) -> Value<'_> {
//! #         match name {
//! #             "id" => Value::Integer(self.id),
//! #             "is_disabled" => Value::Bool(self.disabled),
//! #             _ => Value::Null,
//! #         }
//! #     }
//! # }
//!
//! let spec = Specification::<Item>::builder()
//!     .where_condition(Condition::eq("is_disabled", false))
//!     .order_by_descending("id")?
//!     .take(10)?
//!     .build();
//! assert_eq!(spec.take(), Some(10));
//!
//! let err = Specification::<Item>::builder().take(5)?.take(5).err();
//! assert!(matches!(err, Some(SpecError::DuplicateTake)));
//! # Ok::<(), SpecError>(())
//! ```

use std::any::type_name;
use std::sync::Arc;
use std::time::Duration;

use crate::condition::Condition;
use crate::error::{Result, SpecError};
use crate::specification::{
    CacheMode, ExpirationMode, ProjectedSpecification, Specification, TrackingMode,
};
use crate::terms::{
    IncludeTerm, OrderKind, OrderTerm, PostProcess, Predicate, Projector, SearchTerm, Selector,
};
use crate::value::Entity;

/// Group number used by [`SpecificationBuilder::search`].
pub const DEFAULT_SEARCH_GROUP: u32 = 1;

/// Mutable draft of a [`Specification`].
pub struct SpecificationBuilder<T> {
    draft: Specification<T>,
    /// Property type of the include chain that `then_include` may extend.
    chain: Option<&'static str>,
}

impl<T: Entity> Default for SpecificationBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> SpecificationBuilder<T> {
    pub fn new() -> Self {
        Self {
            draft: Specification::empty(),
            chain: None,
        }
    }

    // ── Filtering ──────────────────────────────────────────────────────

    /// Appends a structured condition. All where terms are ANDed.
    pub fn where_condition(self, condition: Condition) -> Self {
        self.where_predicate(Predicate::Condition(condition))
    }

    /// Appends a native closure predicate (in-memory only).
    pub fn where_fn(self, f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.where_predicate(Predicate::native(f))
    }

    pub fn where_predicate(mut self, predicate: Predicate<T>) -> Self {
        self.chain = None;
        self.draft.where_terms.push(predicate);
        self
    }

    // ── Ordering ───────────────────────────────────────────────────────

    pub fn order_by(self, selector: impl Into<Selector<T>>) -> Result<Self> {
        self.push_primary(selector.into(), OrderKind::OrderBy)
    }

    pub fn order_by_descending(self, selector: impl Into<Selector<T>>) -> Result<Self> {
        self.push_primary(selector.into(), OrderKind::OrderByDescending)
    }

    pub fn then_by(self, selector: impl Into<Selector<T>>) -> Result<Self> {
        self.push_secondary(selector.into(), OrderKind::ThenBy)
    }

    pub fn then_by_descending(self, selector: impl Into<Selector<T>>) -> Result<Self> {
        self.push_secondary(selector.into(), OrderKind::ThenByDescending)
    }

    fn push_primary(mut self, selector: Selector<T>, kind: OrderKind) -> Result<Self> {
        if self.draft.order_terms.iter().any(|t| t.kind.is_primary()) {
            return Err(SpecError::DuplicateOrderBy);
        }
        self.chain = None;
        self.draft.order_terms.push(OrderTerm { selector, kind });
        Ok(self)
    }

    fn push_secondary(mut self, selector: Selector<T>, kind: OrderKind) -> Result<Self> {
        if !self.draft.order_terms.iter().any(|t| t.kind.is_primary()) {
            return Err(SpecError::ThenByWithoutOrderBy);
        }
        self.chain = None;
        self.draft.order_terms.push(OrderTerm { selector, kind });
        Ok(self)
    }

    // ── Includes ───────────────────────────────────────────────────────

    /// Eager-loads a single-valued navigation of type `P`.
    pub fn include<P: ?Sized + 'static>(self, property: impl Into<String>) -> Self {
        self.push_root::<P>(property.into(), false)
    }

    /// Eager-loads a collection navigation whose elements are `P`.
    pub fn include_many<P: ?Sized + 'static>(self, property: impl Into<String>) -> Self {
        self.push_root::<P>(property.into(), true)
    }

    /// Extends the include chain opened by the previous call.
    pub fn then_include<P: ?Sized + 'static>(self, property: impl Into<String>) -> Result<Self> {
        self.push_chained::<P>(property.into(), false)
    }

    pub fn then_include_many<P: ?Sized + 'static>(
        self,
        property: impl Into<String>,
    ) -> Result<Self> {
        self.push_chained::<P>(property.into(), true)
    }

    fn push_root<P: ?Sized + 'static>(mut self, property: String, collection: bool) -> Self {
        self.draft
            .include_terms
            .push(IncludeTerm::root::<T, P>(property, collection));
        self.chain = Some(type_name::<P>());
        self
    }

    fn push_chained<P: ?Sized + 'static>(
        mut self,
        property: String,
        collection: bool,
    ) -> Result<Self> {
        let Some(previous) = self.chain else {
            return Err(SpecError::ThenIncludeWithoutInclude { property });
        };
        self.draft
            .include_terms
            .push(IncludeTerm::chained::<P>(previous, property, collection));
        self.chain = Some(type_name::<P>());
        Ok(self)
    }

    // ── Search ─────────────────────────────────────────────────────────

    /// Adds a `LIKE` search term in the default group.
    pub fn search(self, selector: impl Into<Selector<T>>, pattern: impl Into<String>) -> Self {
        self.search_in_group(selector, pattern, DEFAULT_SEARCH_GROUP)
    }

    /// Adds a search term to `group`. Terms in one group are ORed, groups are
    /// ANDed.
    pub fn search_in_group(
        mut self,
        selector: impl Into<Selector<T>>,
        pattern: impl Into<String>,
        group: u32,
    ) -> Self {
        self.chain = None;
        self.draft.search_terms.push(SearchTerm {
            selector: selector.into(),
            pattern: pattern.into(),
            group,
        });
        self
    }

    // ── Paging and grouping ────────────────────────────────────────────

    pub fn take(mut self, n: usize) -> Result<Self> {
        if self.draft.take.is_some() {
            return Err(SpecError::DuplicateTake);
        }
        self.chain = None;
        self.draft.take = Some(n);
        Ok(self)
    }

    pub fn skip(mut self, n: usize) -> Result<Self> {
        if self.draft.skip.is_some() {
            return Err(SpecError::DuplicateSkip);
        }
        self.chain = None;
        self.draft.skip = Some(n);
        Ok(self)
    }

    pub fn group_by(mut self, selector: impl Into<Selector<T>>) -> Result<Self> {
        if self.draft.group_by.is_some() {
            return Err(SpecError::DuplicateGroupBy);
        }
        self.chain = None;
        self.draft.group_by = Some(selector.into());
        Ok(self)
    }

    // ── Execution options ──────────────────────────────────────────────

    /// Enables caching under an explicit key.
    pub fn with_cache(mut self, key: impl Into<String>) -> Self {
        self.chain = None;
        self.draft.cache.mode = CacheMode::Enabled;
        self.draft.cache.key = Some(key.into());
        self
    }

    /// Enables caching with an entry lifetime.
    pub fn cache_timeout(mut self, timeout: Duration, mode: ExpirationMode) -> Self {
        self.chain = None;
        self.draft.cache.mode = CacheMode::Enabled;
        self.draft.cache.timeout = Some(timeout);
        self.draft.cache.expiration_mode = Some(mode);
        self
    }

    pub fn disable_cache(mut self) -> Self {
        self.chain = None;
        self.draft.cache.mode = CacheMode::Disabled;
        self
    }

    pub fn as_no_tracking(mut self) -> Self {
        self.chain = None;
        self.draft.tracking = TrackingMode::NoTracking;
        self
    }

    pub fn as_no_tracking_with_identity_resolution(mut self) -> Self {
        self.chain = None;
        self.draft.tracking = TrackingMode::NoTrackingWithIdentityResolution;
        self
    }

    pub fn as_split_query(mut self) -> Self {
        self.chain = None;
        self.draft.split_query = true;
        self
    }

    pub fn ignore_query_filters(mut self) -> Self {
        self.chain = None;
        self.draft.ignore_query_filters = true;
        self
    }

    /// Sets the transform applied to materialized results.
    pub fn post_process(
        mut self,
        transform: impl Fn(Vec<T>) -> Vec<T> + Send + Sync + 'static,
    ) -> Self {
        let transform: PostProcess<T> = Arc::new(transform);
        self.chain = None;
        self.draft.post_processing = Some(transform);
        self
    }

    // ── Finish ─────────────────────────────────────────────────────────

    /// Seals the draft.
    pub fn build(self) -> Specification<T> {
        self.draft
    }

    /// Continues as a projected specification producing `R`.
    pub fn project<R: 'static>(self) -> ProjectionBuilder<T, R> {
        ProjectionBuilder {
            draft: ProjectedSpecification {
                base: self.draft,
                selector: None,
                members_to_expand: Vec::new(),
                post_processing: None,
            },
        }
    }
}

/// Draft of a [`ProjectedSpecification`].
pub struct ProjectionBuilder<T, R> {
    draft: ProjectedSpecification<T, R>,
}

impl<T: Entity, R: 'static> ProjectionBuilder<T, R> {
    /// Sets the projector. A later call replaces an earlier one.
    pub fn select(mut self, projector: impl Fn(&T) -> R + Send + Sync + 'static) -> Self {
        let projector: Projector<T, R> = Arc::new(projector);
        self.draft.selector = Some(projector);
        self
    }

    /// Asks the projector to materialize `member`. Duplicates are ignored.
    pub fn expand(mut self, member: impl Into<String>) -> Self {
        let member = member.into();
        if !self.draft.members_to_expand.contains(&member) {
            self.draft.members_to_expand.push(member);
        }
        self
    }

    /// Sets the transform applied to projected results.
    pub fn post_process(
        mut self,
        transform: impl Fn(Vec<R>) -> Vec<R> + Send + Sync + 'static,
    ) -> Self {
        let transform: PostProcess<R> = Arc::new(transform);
        self.draft.post_processing = Some(transform);
        self
    }

    pub fn build(self) -> ProjectedSpecification<T, R> {
        self.draft
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terms::IncludeKind;
    use crate::value::Value;

    struct Guild {
        id: i64,
    }

    struct ModerationConfig;
    struct Role;

    impl Entity for Guild {
        fn field(&self, name: &str) -> Value<'_> {
            match name {
                "id" => Value::Integer(self.id),
                _ => Value::Null,
            }
        }
    }

    #[test]
    fn duplicate_take_fails_on_second_call() {
        let err = Specification::<Guild>::builder()
            .take(5)
            .unwrap()
            .take(5)
            .err()
            .unwrap();
        assert!(matches!(err, SpecError::DuplicateTake));
        assert!(err.is_duplicate_pagination());
    }

    #[test]
    fn duplicate_skip_fails_on_second_call() {
        let err = Specification::<Guild>::builder()
            .skip(1)
            .unwrap()
            .skip(2)
            .err()
            .unwrap();
        assert!(matches!(err, SpecError::DuplicateSkip));
    }

    #[test]
    fn second_primary_order_is_rejected() {
        let err = Specification::<Guild>::builder()
            .order_by("name")
            .unwrap()
            .order_by_descending("id")
            .err()
            .unwrap();
        assert!(matches!(err, SpecError::DuplicateOrderBy));

        let spec = Specification::<Guild>::builder()
            .order_by("name")
            .unwrap()
            .then_by("id")
            .unwrap()
            .build();
        assert_eq!(spec.order_terms().len(), 2);
    }

    #[test]
    fn then_by_requires_primary() {
        let err = Specification::<Guild>::builder()
            .then_by("id")
            .err()
            .unwrap();
        assert!(matches!(err, SpecError::ThenByWithoutOrderBy));
    }

    #[test]
    fn group_by_is_set_once() {
        let err = Specification::<Guild>::builder()
            .group_by("id")
            .unwrap()
            .group_by("name")
            .err()
            .unwrap();
        assert!(matches!(err, SpecError::DuplicateGroupBy));
    }

    #[test]
    fn then_include_chains_off_previous_include() {
        let spec = Specification::<Guild>::builder()
            .include::<ModerationConfig>("moderation_config")
            .then_include::<Role>("muted_role")
            .unwrap()
            .include_many::<Role>("roles")
            .build();

        let terms = spec.include_terms();
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0].kind, IncludeKind::Include);
        assert_eq!(terms[0].declaring_type, type_name::<Guild>());
        assert_eq!(terms[1].kind, IncludeKind::ThenInclude);
        assert_eq!(
            terms[1].previous_property_type,
            Some(type_name::<ModerationConfig>())
        );
        assert!(terms[2].collection);

        let paths: Vec<String> = spec.include_paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["moderation_config.muted_role", "roles"]);
    }

    #[test]
    fn then_include_without_open_chain_fails() {
        let err = Specification::<Guild>::builder()
            .include::<ModerationConfig>("moderation_config")
            .take(1)
            .unwrap()
            .then_include::<Role>("muted_role")
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SpecError::ThenIncludeWithoutInclude { ref property } if property == "muted_role"
        ));
    }

    #[test]
    fn tracking_setters_last_call_wins() {
        let spec = Specification::<Guild>::builder()
            .as_no_tracking()
            .as_no_tracking_with_identity_resolution()
            .build();
        assert!(!spec.as_no_tracking());
        assert!(spec.as_no_tracking_with_identity_resolution());
    }

    #[test]
    fn cache_options() {
        let spec = Specification::<Guild>::builder()
            .with_cache("guild:active")
            .cache_timeout(Duration::from_secs(30), ExpirationMode::Sliding)
            .build();
        assert!(spec.cache_enabled());
        assert_eq!(spec.cache_key(), Some("guild:active"));
        assert_eq!(spec.cache_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(spec.cache_expiration_mode(), Some(ExpirationMode::Sliding));

        let disabled = Specification::<Guild>::builder()
            .with_cache("k")
            .disable_cache()
            .build();
        assert!(!disabled.cache_enabled());
        assert_eq!(disabled.cache_policy().mode, CacheMode::Disabled);
    }

    #[test]
    fn paging_flag_follows_take_and_skip() {
        let plain = Specification::<Guild>::builder().build();
        assert!(!plain.is_paging_enabled());
        let paged = Specification::<Guild>::builder().skip(3).unwrap().build();
        assert!(paged.is_paging_enabled());
    }

    #[test]
    fn default_paging_never_overrides() {
        let spec = Specification::<Guild>::builder().take(5).unwrap().build();
        let filled = spec.with_default_paging(Some(10), Some(50));
        assert_eq!(filled.take(), Some(5));
        assert_eq!(filled.skip(), Some(10));
        assert_eq!(spec.skip(), None);
    }

    #[test]
    fn projection_builder_collects_expand_hints() {
        let projected = Specification::<Guild>::builder()
            .project::<i64>()
            .expand("roles")
            .expand("roles")
            .select(|g| g.id)
            .build();
        assert_eq!(projected.members_to_expand(), ["roles".to_string()]);
        assert!(projected.selector().is_some());
    }

    #[test]
    fn is_satisfied_by_uses_only_where_terms() {
        let spec = Specification::<Guild>::builder()
            .where_condition(Condition::gt("id", 10))
            .take(0)
            .unwrap()
            .build();
        assert!(spec.is_satisfied_by(&Guild { id: 11 }));
        assert!(!spec.is_satisfied_by(&Guild { id: 3 }));
    }
}
