//! Integration tests for the quarry-spec crate.
//!
//! These tests drive specifications end to end through both evaluators and
//! the factory, the way a repository would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use quarry_spec::{
    CachePolicy, Condition, Entity, IncludePath, InMemorySpecificationEvaluator, Literal,
    OrderTerm, Predicate, Queryable, ScopedSpecification, SearchTerm, Selector, SpecError,
    Specification, SpecificationEvaluator, SpecificationFactory, TrackingMode, Value,
};

// ═══════════════════════════════════════════════════════════════════════
//  Fixtures
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
struct Item {
    id: i64,
    name: String,
    is_disabled: bool,
    created_at: DateTime<Utc>,
}

impl Entity for Item {
    fn field(&self, name: &str) -> Value<'_> {
        match name {
            "id" => Value::Integer(self.id),
            "name" => Value::Text(&self.name),
            "is_disabled" => Value::Bool(self.is_disabled),
            "created_at" => Value::Timestamp(self.created_at.timestamp_millis()),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, PartialEq)]
struct ItemDto {
    id: i64,
    label: String,
}

/// 25 items, one per hour; every fifth item is disabled.
fn items() -> Vec<Item> {
    let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (1..=25)
        .map(|id| Item {
            id,
            name: format!("item-{id:02}"),
            is_disabled: id % 5 == 0,
            created_at: epoch + Duration::hours(id),
        })
        .collect()
}

fn ids(items: &[Item]) -> Vec<i64> {
    items.iter().map(|i| i.id).collect()
}

fn newest_enabled(skip: usize, take: usize) -> Specification<Item> {
    Specification::builder()
        .where_condition(Condition::eq("is_disabled", false))
        .order_by_descending("created_at")
        .unwrap()
        .skip(skip)
        .unwrap()
        .take(take)
        .unwrap()
        .build()
}

// ═══════════════════════════════════════════════════════════════════════
//  Scenarios
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn first_page_returns_ten_newest_enabled_items() {
    let out = InMemorySpecificationEvaluator::instance()
        .evaluate(items(), &newest_enabled(0, 10))
        .unwrap();
    assert_eq!(ids(&out), vec![24, 23, 22, 21, 19, 18, 17, 16, 14, 13]);
    assert!(out.iter().all(|i| !i.is_disabled));
}

#[test]
fn last_partial_page_returns_oldest_items_newest_first() {
    let out = InMemorySpecificationEvaluator::instance()
        .evaluate(items(), &newest_enabled(15, 10))
        .unwrap();
    assert_eq!(ids(&out), vec![6, 4, 3, 2, 1]);
}

#[test]
fn duplicate_take_is_rejected_on_second_call() {
    let result = Specification::<Item>::builder().take(5).unwrap().take(5);
    assert!(matches!(result.err(), Some(SpecError::DuplicateTake)));
}

#[test]
fn duplicate_primary_order_is_rejected() {
    let result = Specification::<Item>::builder()
        .order_by("name")
        .unwrap()
        .order_by("id");
    assert!(matches!(result.err(), Some(SpecError::DuplicateOrderBy)));

    let ok = Specification::<Item>::builder()
        .order_by("name")
        .unwrap()
        .then_by("id");
    assert!(ok.is_ok());
}

#[test]
fn projection_without_selector_fails_before_any_query() {
    let spec = Specification::<Item>::builder()
        .where_condition(Condition::eq("is_disabled", false))
        .project::<ItemDto>()
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let query = CountingQuery(Arc::clone(&calls));
    let err = SpecificationEvaluator::instance()
        .get_projected_query(query, &spec, false)
        .err()
        .unwrap();
    assert!(matches!(err, SpecError::MissingSelector { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let err = InMemorySpecificationEvaluator::instance()
        .evaluate_projected(items(), &spec)
        .unwrap_err();
    assert!(matches!(err, SpecError::MissingSelector { .. }));
}

#[test]
fn in_memory_search_is_unsupported() {
    let spec = Specification::<Item>::builder()
        .search("name", "%foo%")
        .build();
    let err = InMemorySpecificationEvaluator::instance()
        .evaluate(items(), &spec)
        .unwrap_err();
    assert!(matches!(err, SpecError::SearchNotSupportedInMemory { terms: 1 }));
}

// ═══════════════════════════════════════════════════════════════════════
//  Ordering, projection and membership
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn descending_primary_with_ascending_tie_breaker() {
    let epoch = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let make = |id, name: &str, hours| Item {
        id,
        name: name.to_string(),
        is_disabled: false,
        created_at: epoch + Duration::hours(hours),
    };
    let data = vec![
        make(1, "delta", 1),
        make(2, "bravo", 2),
        make(3, "alpha", 2),
        make(4, "charlie", 1),
    ];
    let spec = Specification::<Item>::builder()
        .order_by_descending("created_at")
        .unwrap()
        .then_by("name")
        .unwrap()
        .build();
    let out = InMemorySpecificationEvaluator::instance()
        .evaluate(data, &spec)
        .unwrap();
    assert_eq!(ids(&out), vec![3, 2, 4, 1]);
}

#[test]
fn projected_results_follow_entity_pipeline() {
    let spec = Specification::<Item>::builder()
        .where_fn(|i| i.id <= 3)
        .order_by_descending(Selector::native(|i: &Item| Literal::from(i.id)))
        .unwrap()
        .project::<ItemDto>()
        .select(|i| ItemDto {
            id: i.id,
            label: i.name.to_uppercase(),
        })
        .build();
    let out = InMemorySpecificationEvaluator::instance()
        .evaluate_projected(items(), &spec)
        .unwrap();
    assert_eq!(
        out,
        vec![
            ItemDto { id: 3, label: "ITEM-03".into() },
            ItemDto { id: 2, label: "ITEM-02".into() },
            ItemDto { id: 1, label: "ITEM-01".into() },
        ]
    );
}

#[test]
fn satisfied_by_ignores_paging_and_order() {
    let spec = newest_enabled(100, 0);
    let data = items();
    assert!(spec.is_satisfied_by(&data[0]));
    assert!(!spec.is_satisfied_by(&data[4]));
    assert!(
        InMemorySpecificationEvaluator::instance()
            .evaluate(data, &spec)
            .unwrap()
            .is_empty()
    );
}

// ═══════════════════════════════════════════════════════════════════════
//  Store-backed composition
// ═══════════════════════════════════════════════════════════════════════

/// Counts every composition call without recording it.
struct CountingQuery(Arc<AtomicUsize>);

impl CountingQuery {
    fn bump(self) -> Self {
        self.0.fetch_add(1, Ordering::SeqCst);
        self
    }
}

impl Queryable<Item> for CountingQuery {
    fn filter(self, _: Predicate<Item>) -> Self {
        self.bump()
    }
    fn search(self, _: Vec<SearchTerm<Item>>) -> Self {
        self.bump()
    }
    fn include(self, _: IncludePath) -> Self {
        self.bump()
    }
    fn order_by(self, _: OrderTerm<Item>) -> Self {
        self.bump()
    }
    fn skip(self, _: usize) -> Self {
        self.bump()
    }
    fn take(self, _: usize) -> Self {
        self.bump()
    }
    fn with_tracking(self, _: TrackingMode) -> Self {
        self.bump()
    }
    fn split_query(self) -> Self {
        self.bump()
    }
    fn ignore_query_filters(self) -> Self {
        self.bump()
    }
    fn group_by(self, _: Selector<Item>) -> Self {
        self.bump()
    }
    fn cacheable(self, _: CachePolicy) -> Self {
        self.bump()
    }
}

#[test]
fn criteria_only_skips_shape_stages() {
    let calls = Arc::new(AtomicUsize::new(0));
    let spec = newest_enabled(0, 10);

    SpecificationEvaluator::instance().get_query(CountingQuery(Arc::clone(&calls)), &spec, true);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    calls.store(0, Ordering::SeqCst);
    SpecificationEvaluator::instance().get_query(CountingQuery(Arc::clone(&calls)), &spec, false);
    // filter, order, skip, take
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

// ═══════════════════════════════════════════════════════════════════════
//  Factory
// ═══════════════════════════════════════════════════════════════════════

static ACTIVE_BUILDS: AtomicUsize = AtomicUsize::new(0);

struct ActiveItems(Specification<Item>);

impl ScopedSpecification for ActiveItems {
    fn create() -> quarry_spec::Result<Self> {
        ACTIVE_BUILDS.fetch_add(1, Ordering::SeqCst);
        Ok(Self(
            Specification::builder()
                .where_condition(Condition::eq("is_disabled", false))
                .order_by("id")?
                .build(),
        ))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn factory_constructs_once_per_scope_across_tasks() {
    let factory = SpecificationFactory::new();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let factory = factory.clone();
        handles.push(tokio::spawn(async move {
            factory.get_specification::<ActiveItems>().unwrap()
        }));
    }
    let mut specs = Vec::new();
    for handle in handles {
        specs.push(handle.await.unwrap());
    }

    assert_eq!(ACTIVE_BUILDS.load(Ordering::SeqCst), 1);
    assert!(specs.iter().all(|s| Arc::ptr_eq(s, &specs[0])));

    let out = InMemorySpecificationEvaluator::instance()
        .evaluate(items(), &specs[0].0)
        .unwrap();
    assert_eq!(out.len(), 20);
}
