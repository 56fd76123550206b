//! In-memory evaluation.
//!
//! Runs the subset of the pipeline that makes sense for an already
//! materialized sequence:
//!
//! ```text
//! Where → Order → Pagination → GroupBy → post-processing
//! ```
//!
//! Search terms are store-specific and are rejected up front instead of being
//! silently dropped.

use std::any::type_name;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Result, SpecError};
use crate::evaluator::resolve_projector;
use crate::mapping::MappingRegistry;
use crate::specification::{ProjectedSpecification, Specification};
use crate::terms::OrderTerm;
use crate::value::{Entity, Literal};

static DEFAULT_IN_MEMORY: InMemorySpecificationEvaluator = InMemorySpecificationEvaluator {
    mappings: None,
};

/// Evaluates specifications over owned sequences.
#[derive(Debug, Clone, Default)]
pub struct InMemorySpecificationEvaluator {
    mappings: Option<MappingRegistry>,
}

impl InMemorySpecificationEvaluator {
    /// The shared evaluator.
    pub fn instance() -> &'static InMemorySpecificationEvaluator {
        &DEFAULT_IN_MEMORY
    }

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `registry` when a projected specification has no selector.
    #[must_use]
    pub fn with_mappings(mut self, registry: MappingRegistry) -> Self {
        self.mappings = Some(registry);
        self
    }

    /// Filters, orders, pages and groups `items`, then applies the
    /// specification's post-processing.
    pub fn evaluate<T, I>(&self, items: I, spec: &Specification<T>) -> Result<Vec<T>>
    where
        T: Entity,
        I: IntoIterator<Item = T>,
    {
        let items = self.run(items, spec)?;
        Ok(match spec.post_processing() {
            Some(transform) => transform(items),
            None => items,
        })
    }

    /// Like [`evaluate`](Self::evaluate), then projects each item and applies
    /// the projected post-processing.
    pub fn evaluate_projected<T, R, I>(
        &self,
        items: I,
        spec: &ProjectedSpecification<T, R>,
    ) -> Result<Vec<R>>
    where
        T: Entity,
        R: 'static,
        I: IntoIterator<Item = T>,
    {
        ensure_no_search(spec.base())?;
        let projector = resolve_projector(self.mappings.as_ref(), spec)?;
        let entities = self.evaluate(items, spec.base())?;
        let projected: Vec<R> = entities.iter().map(|item| projector(item)).collect();
        Ok(match spec.post_processing() {
            Some(transform) => transform(projected),
            None => projected,
        })
    }

    fn run<T, I>(&self, items: I, spec: &Specification<T>) -> Result<Vec<T>>
    where
        T: Entity,
        I: IntoIterator<Item = T>,
    {
        ensure_no_search(spec)?;

        let mut items: Vec<T> = items
            .into_iter()
            .filter(|item| spec.is_satisfied_by(item))
            .collect();
        let matched = items.len();

        if !spec.order_terms().is_empty() {
            items = sort_by_terms(items, spec.order_terms());
        }

        if spec.is_paging_enabled() {
            let skip = spec.skip().unwrap_or(0);
            let take = spec.take().unwrap_or(usize::MAX);
            items = items.into_iter().skip(skip).take(take).collect();
        }

        if let Some(selector) = spec.group_by() {
            items = group_stable(items, |item| selector.extract(item));
        }

        tracing::debug!(
            entity = type_name::<T>(),
            matched,
            returned = items.len(),
            "evaluated specification in memory"
        );
        Ok(items)
    }
}

fn ensure_no_search<T>(spec: &Specification<T>) -> Result<()> {
    match spec.search_terms().len() {
        0 => Ok(()),
        terms => Err(SpecError::SearchNotSupportedInMemory { terms }),
    }
}

/// Stable sort by a list of order terms. Keys are extracted once per item.
pub fn sort_by_terms<T: Entity>(items: Vec<T>, terms: &[OrderTerm<T>]) -> Vec<T> {
    let mut keyed: Vec<(Vec<Literal>, T)> = items
        .into_iter()
        .map(|item| {
            let keys = terms.iter().map(|t| t.selector.extract(&item)).collect();
            (keys, item)
        })
        .collect();

    keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, terms));
    keyed.into_iter().map(|(_, item)| item).collect()
}

fn compare_keys<T>(a: &[Literal], b: &[Literal], terms: &[OrderTerm<T>]) -> Ordering {
    for ((x, y), term) in a.iter().zip(b).zip(terms) {
        let ordering = x.sort_cmp(y);
        let ordering = if term.kind.is_descending() {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Regroups `items` so that items with equal keys are contiguous.
///
/// Groups appear in the order their key was first seen and items keep their
/// relative order inside a group.
pub fn group_stable<T, F>(items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> Literal,
{
    let mut index: BTreeMap<GroupKey, usize> = BTreeMap::new();
    let mut groups: Vec<Vec<T>> = Vec::new();
    for item in items {
        let slot = *index.entry(GroupKey(key(&item))).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(item);
    }
    groups.into_iter().flatten().collect()
}

/// A [`Literal`] ordered by [`Literal::sort_cmp`].
struct GroupKey(Literal);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.sort_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::terms::Selector;
    use crate::value::Value;

    #[derive(Debug, Clone, PartialEq)]
    struct Warning {
        id: i64,
        user: &'static str,
        points: i64,
    }

    impl Entity for Warning {
        fn field(&self, name: &str) -> Value<'_> {
            match name {
                "id" => Value::Integer(self.id),
                "user" => Value::Text(self.user),
                "points" => Value::Integer(self.points),
                _ => Value::Null,
            }
        }
    }

    fn warnings() -> Vec<Warning> {
        vec![
            Warning { id: 1, user: "ana", points: 3 },
            Warning { id: 2, user: "bo", points: 1 },
            Warning { id: 3, user: "ana", points: 1 },
            Warning { id: 4, user: "cy", points: 5 },
            Warning { id: 5, user: "bo", points: 3 },
        ]
    }

    fn ids(items: &[Warning]) -> Vec<i64> {
        items.iter().map(|w| w.id).collect()
    }

    #[test]
    fn order_then_by_is_stable() {
        let spec = Specification::<Warning>::builder()
            .order_by_descending("points")
            .unwrap()
            .then_by("user")
            .unwrap()
            .build();
        let out = InMemorySpecificationEvaluator::instance()
            .evaluate(warnings(), &spec)
            .unwrap();
        assert_eq!(ids(&out), vec![4, 1, 5, 3, 2]);
    }

    #[test]
    fn group_stable_merges_equal_keys_across_many_groups() {
        let keys: Vec<Literal> = (0..1_000)
            .map(|i| match i % 3 {
                0 => Literal::Integer(i % 250),
                1 => Literal::Float((i % 250) as f64),
                _ => Literal::Null,
            })
            .collect();
        let grouped = group_stable((0..keys.len()).collect(), |i| keys[*i].clone());

        let mut runs = 0;
        for pair in grouped.windows(2) {
            if keys[pair[0]].sort_cmp(&keys[pair[1]]) != Ordering::Equal {
                runs += 1;
            }
        }
        // 250 numeric keys plus null, each one contiguous run.
        assert_eq!(runs + 1, 251);
        assert_eq!(grouped[0], 0);
        assert!(grouped.windows(2).all(|w| {
            keys[w[0]].sort_cmp(&keys[w[1]]) != Ordering::Equal || w[0] < w[1]
        }));
    }

    #[test]
    fn group_by_keeps_first_seen_order() {
        let spec = Specification::<Warning>::builder()
            .group_by("user")
            .unwrap()
            .build();
        let out = InMemorySpecificationEvaluator::new()
            .evaluate(warnings(), &spec)
            .unwrap();
        assert_eq!(ids(&out), vec![1, 3, 2, 5, 4]);
    }

    #[test]
    fn group_by_runs_after_pagination() {
        let spec = Specification::<Warning>::builder()
            .take(3)
            .unwrap()
            .group_by(Selector::native(|w: &Warning| Literal::from(w.user)))
            .unwrap()
            .build();
        let out = InMemorySpecificationEvaluator::instance()
            .evaluate(warnings(), &spec)
            .unwrap();
        assert_eq!(ids(&out), vec![1, 3, 2]);
    }

    #[test]
    fn skip_without_take() {
        let spec = Specification::<Warning>::builder().skip(3).unwrap().build();
        let out = InMemorySpecificationEvaluator::instance()
            .evaluate(warnings(), &spec)
            .unwrap();
        assert_eq!(ids(&out), vec![4, 5]);
    }

    #[test]
    fn search_terms_are_rejected() {
        let spec = Specification::<Warning>::builder()
            .search("user", "%an%")
            .build();
        let err = InMemorySpecificationEvaluator::instance()
            .evaluate(warnings(), &spec)
            .unwrap_err();
        assert!(matches!(err, SpecError::SearchNotSupportedInMemory { terms: 1 }));
    }

    #[test]
    fn post_processing_runs_last() {
        let spec = Specification::<Warning>::builder()
            .where_condition(Condition::gte("points", 3i64))
            .order_by("id")
            .unwrap()
            .post_process(|mut items| {
                items.reverse();
                items
            })
            .build();
        let out = InMemorySpecificationEvaluator::instance()
            .evaluate(warnings(), &spec)
            .unwrap();
        assert_eq!(ids(&out), vec![5, 4, 1]);
    }

    #[test]
    fn projected_evaluation_applies_both_post_processing_steps() {
        let spec = Specification::<Warning>::builder()
            .where_fn(|w| w.user == "ana")
            .post_process(|items| items.into_iter().rev().collect())
            .project::<String>()
            .select(|w| format!("{}#{}", w.user, w.id))
            .post_process(|mut names| {
                names.push("end".into());
                names
            })
            .build();
        let out = InMemorySpecificationEvaluator::instance()
            .evaluate_projected(warnings(), &spec)
            .unwrap();
        assert_eq!(out, vec!["ana#3", "ana#1", "end"]);
    }

    #[test]
    fn projected_evaluation_without_selector_fails() {
        let spec = Specification::<Warning>::builder()
            .project::<i64>()
            .build();
        let err = InMemorySpecificationEvaluator::instance()
            .evaluate_projected(warnings(), &spec)
            .unwrap_err();
        assert!(matches!(err, SpecError::MissingSelector { .. }));
    }

    #[test]
    fn projected_evaluation_uses_registered_mapping() {
        let registry = MappingRegistry::new();
        registry.register(|w: &Warning, _: &[String]| w.points);
        let spec = Specification::<Warning>::builder()
            .order_by("id")
            .unwrap()
            .project::<i64>()
            .build();
        let out = InMemorySpecificationEvaluator::new()
            .with_mappings(registry)
            .evaluate_projected(warnings(), &spec)
            .unwrap();
        assert_eq!(out, vec![3, 1, 1, 5, 3]);
    }
}
