//! Sealed specification values.
//!
//! A [`Specification`] is produced by [`SpecificationBuilder::build`] and has
//! no mutators: once built it can be cached, shared across threads and
//! handed to any number of evaluators without changing underneath them.
//!
//! [`SpecificationBuilder::build`]: crate::SpecificationBuilder::build

use std::any::type_name;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::builder::SpecificationBuilder;
use crate::terms::{
    include_paths, IncludePath, IncludeTerm, OrderTerm, PostProcess, Predicate, Projector,
    SearchTerm, Selector,
};
use crate::value::Entity;

// ---------------------------------------------------------------------------
// Execution options
// ---------------------------------------------------------------------------

/// How a cached result expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpirationMode {
    /// Expires a fixed time after it was stored.
    #[default]
    Absolute,
    /// Expires after a period without reads.
    Sliding,
}

/// Whether a query result may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Follow the store's global policy.
    #[default]
    Default,
    /// Cache this query.
    Enabled,
    /// Never cache this query, even when the store caches by default.
    Disabled,
}

/// Cache settings carried by a specification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CachePolicy {
    pub mode: CacheMode,
    /// Explicit cache key; stores derive one from the query when absent.
    pub key: Option<String>,
    /// Entry lifetime; stores fall back to their default when absent.
    pub timeout: Option<Duration>,
    pub expiration_mode: Option<ExpirationMode>,
}

/// Change-tracking behaviour requested from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    #[default]
    Tracking,
    NoTracking,
    NoTrackingWithIdentityResolution,
}

// ---------------------------------------------------------------------------
// Specification<T>
// ---------------------------------------------------------------------------

/// Immutable description of what to fetch and how to shape it.
pub struct Specification<T> {
    pub(crate) where_terms: Vec<Predicate<T>>,
    pub(crate) order_terms: Vec<OrderTerm<T>>,
    pub(crate) include_terms: Vec<IncludeTerm>,
    pub(crate) search_terms: Vec<SearchTerm<T>>,
    pub(crate) group_by: Option<Selector<T>>,
    pub(crate) take: Option<usize>,
    pub(crate) skip: Option<usize>,
    pub(crate) post_processing: Option<PostProcess<T>>,
    pub(crate) tracking: TrackingMode,
    pub(crate) split_query: bool,
    pub(crate) ignore_query_filters: bool,
    pub(crate) cache: CachePolicy,
}

impl<T: Entity> Specification<T> {
    /// Starts a new builder.
    pub fn builder() -> SpecificationBuilder<T> {
        SpecificationBuilder::new()
    }

    /// Evaluates only the where terms against a single entity.
    ///
    /// Ordering, paging, includes and search terms are ignored.
    pub fn is_satisfied_by(&self, item: &T) -> bool {
        self.where_terms.iter().all(|p| p.matches(item))
    }
}

impl<T> Specification<T> {
    pub(crate) fn empty() -> Self {
        Self {
            where_terms: Vec::new(),
            order_terms: Vec::new(),
            include_terms: Vec::new(),
            search_terms: Vec::new(),
            group_by: None,
            take: None,
            skip: None,
            post_processing: None,
            tracking: TrackingMode::Tracking,
            split_query: false,
            ignore_query_filters: false,
            cache: CachePolicy::default(),
        }
    }

    pub fn where_terms(&self) -> &[Predicate<T>] {
        &self.where_terms
    }

    pub fn order_terms(&self) -> &[OrderTerm<T>] {
        &self.order_terms
    }

    pub fn include_terms(&self) -> &[IncludeTerm] {
        &self.include_terms
    }

    /// Navigation paths reconstructed from the include terms.
    pub fn include_paths(&self) -> Vec<IncludePath> {
        include_paths(&self.include_terms)
    }

    pub fn search_terms(&self) -> &[SearchTerm<T>] {
        &self.search_terms
    }

    pub fn group_by(&self) -> Option<&Selector<T>> {
        self.group_by.as_ref()
    }

    pub fn take(&self) -> Option<usize> {
        self.take
    }

    pub fn skip(&self) -> Option<usize> {
        self.skip
    }

    /// `true` once either `take` or `skip` is set.
    pub fn is_paging_enabled(&self) -> bool {
        self.take.is_some() || self.skip.is_some()
    }

    pub fn post_processing(&self) -> Option<&PostProcess<T>> {
        self.post_processing.as_ref()
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        self.tracking
    }

    pub fn as_no_tracking(&self) -> bool {
        self.tracking == TrackingMode::NoTracking
    }

    pub fn as_no_tracking_with_identity_resolution(&self) -> bool {
        self.tracking == TrackingMode::NoTrackingWithIdentityResolution
    }

    pub fn as_split_query(&self) -> bool {
        self.split_query
    }

    pub fn ignore_query_filters(&self) -> bool {
        self.ignore_query_filters
    }

    pub fn cache_policy(&self) -> &CachePolicy {
        &self.cache
    }

    /// `true` when caching was explicitly requested.
    pub fn cache_enabled(&self) -> bool {
        self.cache.mode == CacheMode::Enabled
    }

    pub fn cache_key(&self) -> Option<&str> {
        self.cache.key.as_deref()
    }

    pub fn cache_timeout(&self) -> Option<Duration> {
        self.cache.timeout
    }

    pub fn cache_expiration_mode(&self) -> Option<ExpirationMode> {
        self.cache.expiration_mode
    }

    /// Returns a sealed copy whose missing `skip` / `take` are filled in.
    ///
    /// Values already present on this specification always win; this is how
    /// a caller-supplied page supplements, but never overrides, explicit
    /// pagination.
    pub fn with_default_paging(&self, skip: Option<usize>, take: Option<usize>) -> Self {
        let mut copy = self.clone();
        copy.skip = copy.skip.or(skip);
        copy.take = copy.take.or(take);
        copy
    }
}

impl<T> Clone for Specification<T> {
    fn clone(&self) -> Self {
        Self {
            where_terms: self.where_terms.clone(),
            order_terms: self.order_terms.clone(),
            include_terms: self.include_terms.clone(),
            search_terms: self.search_terms.clone(),
            group_by: self.group_by.clone(),
            take: self.take,
            skip: self.skip,
            post_processing: self.post_processing.clone(),
            tracking: self.tracking,
            split_query: self.split_query,
            ignore_query_filters: self.ignore_query_filters,
            cache: self.cache.clone(),
        }
    }
}

impl<T> fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Specification")
            .field("entity", &type_name::<T>())
            .field("where_terms", &self.where_terms)
            .field("order_terms", &self.order_terms)
            .field("include_terms", &self.include_terms.len())
            .field("search_terms", &self.search_terms)
            .field("group_by", &self.group_by)
            .field("take", &self.take)
            .field("skip", &self.skip)
            .field("post_processing", &self.post_processing.is_some())
            .field("tracking", &self.tracking)
            .field("split_query", &self.split_query)
            .field("ignore_query_filters", &self.ignore_query_filters)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<T> AsRef<Specification<T>> for Specification<T> {
    fn as_ref(&self) -> &Specification<T> {
        self
    }
}

// ---------------------------------------------------------------------------
// ProjectedSpecification<T, R>
// ---------------------------------------------------------------------------

/// A specification whose results are projected from `T` into `R`.
pub struct ProjectedSpecification<T, R> {
    pub(crate) base: Specification<T>,
    pub(crate) selector: Option<Projector<T, R>>,
    pub(crate) members_to_expand: Vec<String>,
    pub(crate) post_processing: Option<PostProcess<R>>,
}

impl<T, R> ProjectedSpecification<T, R> {
    /// The entity-level specification the projection runs after.
    pub fn base(&self) -> &Specification<T> {
        &self.base
    }

    pub fn selector(&self) -> Option<&Projector<T, R>> {
        self.selector.as_ref()
    }

    /// Member names the projector should materialize.
    pub fn members_to_expand(&self) -> &[String] {
        &self.members_to_expand
    }

    /// Transform over the projected results.
    pub fn post_processing(&self) -> Option<&PostProcess<R>> {
        self.post_processing.as_ref()
    }
}

impl<T: Entity, R> ProjectedSpecification<T, R> {
    pub fn is_satisfied_by(&self, item: &T) -> bool {
        self.base.is_satisfied_by(item)
    }
}

impl<T, R> Clone for ProjectedSpecification<T, R> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            selector: self.selector.clone(),
            members_to_expand: self.members_to_expand.clone(),
            post_processing: self.post_processing.clone(),
        }
    }
}

impl<T, R> fmt::Debug for ProjectedSpecification<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectedSpecification")
            .field("base", &self.base)
            .field("result", &type_name::<R>())
            .field("selector", &self.selector.is_some())
            .field("members_to_expand", &self.members_to_expand)
            .field("post_processing", &self.post_processing.is_some())
            .finish()
    }
}

impl<T, R> AsRef<Specification<T>> for ProjectedSpecification<T, R> {
    fn as_ref(&self) -> &Specification<T> {
        &self.base
    }
}
