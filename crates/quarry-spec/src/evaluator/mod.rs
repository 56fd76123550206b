//! Store-backed evaluator pipeline.
//!
//! Each [`Stage`] applies one specification concern to a [`Queryable`]. The
//! default pipeline runs them in a fixed order:
//!
//! ```text
//! Where → Search → Include → Order → Pagination → Tracking → SplitQuery → GroupBy → Caching
//! ```
//!
//! Filtering narrows the set before navigations are attached, ordering fixes
//! the sequence before it is paged, and the remaining stages only annotate
//! the query shape. Where and Search are *criteria* stages: criteria-only
//! evaluation runs just those two.
//!
//! Projection is not a stage. [`SpecificationEvaluator::apply_projection`]
//! runs strictly after the full entity pipeline.

mod caching;
mod filter;
mod group_by;
mod include;
mod order;
mod pagination;
mod search;
mod split_query;
mod tracking;

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SpecError};
use crate::mapping::MappingRegistry;
use crate::queryable::{ProjectedQuery, Queryable};
use crate::specification::{ProjectedSpecification, Specification};
use crate::terms::Projector;
use crate::value::Entity;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One concern of the store-backed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Where,
    Search,
    Include,
    Order,
    Pagination,
    Tracking,
    SplitQuery,
    GroupBy,
    Caching,
}

/// The default stage order.
pub const DEFAULT_PIPELINE: [Stage; 9] = [
    Stage::Where,
    Stage::Search,
    Stage::Include,
    Stage::Order,
    Stage::Pagination,
    Stage::Tracking,
    Stage::SplitQuery,
    Stage::GroupBy,
    Stage::Caching,
];

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Where => "where",
            Stage::Search => "search",
            Stage::Include => "include",
            Stage::Order => "order",
            Stage::Pagination => "pagination",
            Stage::Tracking => "tracking",
            Stage::SplitQuery => "split_query",
            Stage::GroupBy => "group_by",
            Stage::Caching => "caching",
        }
    }

    /// `true` for stages that narrow the result set.
    pub fn is_criteria(self) -> bool {
        matches!(self, Stage::Where | Stage::Search)
    }

    /// Applies this stage to `query`.
    pub fn apply<T: Entity, Q: Queryable<T>>(self, query: Q, spec: &Specification<T>) -> Q {
        match self {
            Stage::Where => filter::apply(query, spec),
            Stage::Search => search::apply(query, spec),
            Stage::Include => include::apply(query, spec),
            Stage::Order => order::apply(query, spec),
            Stage::Pagination => pagination::apply(query, spec),
            Stage::Tracking => tracking::apply(query, spec),
            Stage::SplitQuery => split_query::apply(query, spec),
            Stage::GroupBy => group_by::apply(query, spec),
            Stage::Caching => caching::apply(query, spec),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// SpecificationEvaluator
// ---------------------------------------------------------------------------

static DEFAULT_EVALUATOR: SpecificationEvaluator = SpecificationEvaluator::default_pipeline();

/// Runs a specification's stages against a queryable.
///
/// Evaluators hold no per-query state; one instance can serve any number of
/// concurrent callers.
#[derive(Clone)]
pub struct SpecificationEvaluator {
    stages: Cow<'static, [Stage]>,
    mappings: Option<MappingRegistry>,
}

impl SpecificationEvaluator {
    const fn default_pipeline() -> Self {
        Self {
            stages: Cow::Borrowed(&DEFAULT_PIPELINE),
            mappings: None,
        }
    }

    /// The shared evaluator running the default pipeline.
    pub fn instance() -> &'static SpecificationEvaluator {
        &DEFAULT_EVALUATOR
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default_pipeline()
    }

    /// An evaluator running a custom stage list, in the given order.
    pub fn with_stages(stages: impl Into<Vec<Stage>>) -> Self {
        Self {
            stages: Cow::Owned(stages.into()),
            mappings: None,
        }
    }

    /// Uses `registry` when a projected specification has no selector.
    #[must_use]
    pub fn with_mappings(mut self, registry: MappingRegistry) -> Self {
        self.mappings = Some(registry);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn mappings(&self) -> Option<&MappingRegistry> {
        self.mappings.as_ref()
    }

    /// Composes `spec` onto `query`. With `criteria_only`, only the criteria
    /// stages run.
    pub fn get_query<T, Q>(&self, query: Q, spec: &Specification<T>, criteria_only: bool) -> Q
    where
        T: Entity,
        Q: Queryable<T>,
    {
        tracing::debug!(
            entity = type_name::<T>(),
            where_terms = spec.where_terms().len(),
            search_terms = spec.search_terms().len(),
            order_terms = spec.order_terms().len(),
            include_terms = spec.include_terms().len(),
            skip = ?spec.skip(),
            take = ?spec.take(),
            criteria_only,
            "evaluating specification"
        );

        self.stages
            .iter()
            .filter(|stage| !criteria_only || stage.is_criteria())
            .fold(query, |query, stage| {
                tracing::trace!(stage = stage.name(), "applying stage");
                stage.apply(query, spec)
            })
    }

    /// Runs the entity pipeline for `spec.base()`, then attaches the
    /// projection.
    ///
    /// The projector is resolved first, so a missing selector fails before
    /// any stage touches the query.
    pub fn get_projected_query<T, R, Q>(
        &self,
        query: Q,
        spec: &ProjectedSpecification<T, R>,
        criteria_only: bool,
    ) -> Result<ProjectedQuery<Q, T, R>>
    where
        T: Entity,
        R: 'static,
        Q: Queryable<T>,
    {
        let projector = self.resolve_projector(spec)?;
        let query = self.get_query(query, spec.base(), criteria_only);
        Ok(ProjectedQuery::new(
            query,
            projector,
            spec.members_to_expand().to_vec(),
        ))
    }

    /// Attaches the projection of `spec` to an already evaluated query.
    pub fn apply_projection<T, R, Q>(
        &self,
        query: Q,
        spec: &ProjectedSpecification<T, R>,
    ) -> Result<ProjectedQuery<Q, T, R>>
    where
        T: Entity,
        R: 'static,
    {
        let projector = self.resolve_projector(spec)?;
        Ok(ProjectedQuery::new(
            query,
            projector,
            spec.members_to_expand().to_vec(),
        ))
    }

    /// Picks the explicit selector, else the registered mapping bound to the
    /// expand hints.
    pub fn resolve_projector<T, R>(
        &self,
        spec: &ProjectedSpecification<T, R>,
    ) -> Result<Projector<T, R>>
    where
        T: Entity,
        R: 'static,
    {
        resolve_projector(self.mappings.as_ref(), spec)
    }
}

pub(crate) fn resolve_projector<T, R>(
    mappings: Option<&MappingRegistry>,
    spec: &ProjectedSpecification<T, R>,
) -> Result<Projector<T, R>>
where
    T: Entity,
    R: 'static,
{
    if let Some(selector) = spec.selector() {
        return Ok(Arc::clone(selector));
    }
    let mapping = mappings
        .and_then(|registry| registry.get::<T, R>())
        .ok_or(SpecError::MissingSelector {
            entity: type_name::<T>(),
            result: type_name::<R>(),
        })?;
    let members = spec.members_to_expand().to_vec();
    let projector: Projector<T, R> = Arc::new(move |item: &T| mapping(item, &members));
    Ok(projector)
}

impl Default for SpecificationEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpecificationEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecificationEvaluator")
            .field("stages", &self.stages)
            .field("mappings", &self.mappings)
            .finish()
    }
}
