//! Quarry specification engine.
//!
//! This crate describes *what* to fetch independently of *where* it lives:
//!
//! - **[`specification`]** -- Sealed [`Specification`] and
//!   [`ProjectedSpecification`] values plus their execution options
//!   (tracking, split query, cache policy).
//! - **[`builder`]** -- Fluent [`SpecificationBuilder`] that rejects duplicate
//!   pagination, duplicate primary ordering and dangling `then_include` calls
//!   on the offending call.
//! - **[`terms`]** / **[`condition`]** / **[`value`]** -- The term model:
//!   structured, translatable [`Condition`]s next to native closures, key
//!   [`Selector`]s, include paths and search terms.
//! - **[`evaluator`]** -- The store-backed [`SpecificationEvaluator`] composing
//!   a specification onto any [`Queryable`] in a fixed stage order.
//! - **[`memory`]** -- [`InMemorySpecificationEvaluator`] for already
//!   materialized sequences.
//! - **[`factory`]** -- Per-scope, single-flight [`SpecificationFactory`].
//! - **[`mapping`]** -- [`MappingRegistry`] of projections used when a
//!   projected specification has no selector.
//! - **[`error`]** -- Unified [`SpecError`] type via [`thiserror`].
//!
//! Specifications own no I/O resources and are `Send + Sync`; evaluators are
//! stateless and may be shared freely.

pub mod builder;
pub mod condition;
pub mod error;
pub mod evaluator;
pub mod factory;
pub mod mapping;
pub mod memory;
pub mod queryable;
pub mod specification;
pub mod terms;
pub mod value;

pub use builder::{ProjectionBuilder, SpecificationBuilder, DEFAULT_SEARCH_GROUP};
pub use condition::{Condition, Op};
pub use error::{Result, SpecError};
pub use evaluator::{SpecificationEvaluator, Stage, DEFAULT_PIPELINE};
pub use factory::{ScopedSpecification, SpecificationFactory};
pub use mapping::{Mapping, MappingRegistry};
pub use memory::{group_stable, sort_by_terms, InMemorySpecificationEvaluator};
pub use queryable::{ProjectedQuery, Queryable};
pub use specification::{
    CacheMode, CachePolicy, ExpirationMode, ProjectedSpecification, Specification, TrackingMode,
};
pub use terms::{
    include_paths, search_groups, IncludeKind, IncludePath, IncludeTerm, NativeKey,
    NativePredicate, OrderKind, OrderTerm, PostProcess, Predicate, Projector, SearchTerm,
    Selector,
};
pub use value::{compare_values, Entity, Literal, Value};
