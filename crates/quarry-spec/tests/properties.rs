//! Property tests for in-memory evaluation.

use proptest::prelude::*;
use quarry_spec::{
    Condition, Entity, InMemorySpecificationEvaluator, Specification, Value,
};

#[derive(Debug, Clone, PartialEq)]
struct Row {
    id: usize,
    score: i64,
}

impl Entity for Row {
    fn field(&self, name: &str) -> Value<'_> {
        match name {
            "score" => Value::Integer(self.score),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
struct Reading {
    id: usize,
    x: f64,
}

impl Entity for Reading {
    fn field(&self, name: &str) -> Value<'_> {
        match name {
            "x" => Value::Float(self.x),
            _ => Value::Null,
        }
    }
}

fn readings(xs: Vec<f64>) -> Vec<Reading> {
    xs.into_iter()
        .enumerate()
        .map(|(id, x)| Reading { id, x })
        .collect()
}

fn reading_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        1 => Just(f64::NAN),
        3 => (-20i32..20).prop_map(|n| f64::from(n) / 2.0),
    ]
}

fn rows(scores: Vec<i64>) -> Vec<Row> {
    scores
        .into_iter()
        .enumerate()
        .map(|(id, score)| Row { id, score })
        .collect()
}

proptest! {
    #[test]
    fn filtering_matches_is_satisfied_by(
        scores in proptest::collection::vec(-50i64..50, 0..60),
        threshold in -50i64..50,
    ) {
        let data = rows(scores);
        let spec = Specification::<Row>::builder()
            .where_condition(Condition::gte("score", threshold))
            .build();

        let expected: Vec<Row> = data
            .iter()
            .filter(|r| spec.is_satisfied_by(r))
            .cloned()
            .collect();
        let actual = InMemorySpecificationEvaluator::instance()
            .evaluate(data, &spec)
            .unwrap();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn page_length_is_bounded(
        scores in proptest::collection::vec(-50i64..50, 0..60),
        skip in 0usize..80,
        take in 0usize..30,
    ) {
        let data = rows(scores);
        let n = data.len();
        let spec = Specification::<Row>::builder()
            .order_by("score")
            .unwrap()
            .skip(skip)
            .unwrap()
            .take(take)
            .unwrap()
            .build();

        let page = InMemorySpecificationEvaluator::instance()
            .evaluate(data, &spec)
            .unwrap();
        prop_assert_eq!(page.len(), take.min(n.saturating_sub(skip)));
        if skip >= n || take == 0 {
            prop_assert!(page.is_empty());
        }
        prop_assert!(page.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[test]
    fn ordering_is_stable_for_equal_keys(
        scores in proptest::collection::vec(0i64..4, 0..40),
    ) {
        let spec = Specification::<Row>::builder()
            .order_by("score")
            .unwrap()
            .build();
        let sorted = InMemorySpecificationEvaluator::instance()
            .evaluate(rows(scores), &spec)
            .unwrap();
        prop_assert!(sorted
            .windows(2)
            .all(|w| w[0].score < w[1].score || (w[0].score == w[1].score && w[0].id < w[1].id)));
    }

    #[test]
    fn floats_with_nan_sort_nan_first_then_ascending(
        xs in proptest::collection::vec(reading_value(), 0..200),
    ) {
        let spec = Specification::<Reading>::builder()
            .order_by("x")
            .unwrap()
            .build();
        let sorted = InMemorySpecificationEvaluator::instance()
            .evaluate(readings(xs), &spec)
            .unwrap();

        let nans = sorted.iter().take_while(|r| r.x.is_nan()).count();
        let rest = &sorted[nans..];
        prop_assert!(rest.iter().all(|r| !r.x.is_nan()));
        prop_assert!(rest
            .windows(2)
            .all(|w| w[0].x < w[1].x || (w[0].x == w[1].x && w[0].id < w[1].id)));
    }

    #[test]
    fn grouping_floats_with_nan_is_contiguous(
        xs in proptest::collection::vec(reading_value(), 0..120),
    ) {
        let spec = Specification::<Reading>::builder()
            .group_by("x")
            .unwrap()
            .build();
        let grouped = InMemorySpecificationEvaluator::instance()
            .evaluate(readings(xs), &spec)
            .unwrap();

        // Each key, NaN included, forms exactly one run.
        let mut seen: Vec<Option<f64>> = Vec::new();
        let mut last: Option<Option<f64>> = None;
        for r in &grouped {
            let key = (!r.x.is_nan()).then_some(r.x);
            if last != Some(key) {
                prop_assert!(!seen.contains(&key));
                seen.push(key);
                last = Some(key);
            }
        }
    }
}
