//! Structured filter conditions.
//!
//! A [`Condition`] is a small boolean algebra over named fields. Unlike a
//! native closure it is inspectable, so a store can translate it into its own
//! query language while the in-memory path evaluates it directly against
//! [`Entity::field`].
//!
//! Evaluation follows three-valued logic: a comparison against a null field
//! is *unknown*, and only conditions that evaluate to *true* match. This keeps
//! the in-memory result identical to what a SQL store returns for the same
//! condition.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::value::{compare_values, Entity, Literal, Value};

/// Comparison operator of a [`Condition::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Text contains the operand (case-sensitive).
    Contains,
    /// Text starts with the operand (case-sensitive).
    StartsWith,
    /// Text ends with the operand (case-sensitive).
    EndsWith,
}

impl Op {
    /// Returns `true` for the text-matching operators.
    pub fn is_text_op(self) -> bool {
        matches!(self, Op::Contains | Op::StartsWith | Op::EndsWith)
    }

    /// Evaluates an ordering-based operator.
    pub fn eval_ordering(self, ordering: Ordering) -> bool {
        match self {
            Op::Eq => ordering == Ordering::Equal,
            Op::Ne => ordering != Ordering::Equal,
            Op::Gt => ordering == Ordering::Greater,
            Op::Gte => ordering != Ordering::Less,
            Op::Lt => ordering == Ordering::Less,
            Op::Lte => ordering != Ordering::Greater,
            Op::Contains | Op::StartsWith | Op::EndsWith => false,
        }
    }

    /// Short display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Lt => "lt",
            Op::Lte => "lte",
            Op::Contains => "contains",
            Op::StartsWith => "starts_with",
            Op::EndsWith => "ends_with",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, translatable filter condition.
///
/// ```
/// use quarry_spec::Condition;
///
/// let active_recent = Condition::eq("is_disabled", false)
///     .and(Condition::gte("created_at", 1_000i64))
///     .and(Condition::starts_with("name", "mod-").or(Condition::is_null("name")));
/// assert_eq!(active_recent.fields(), vec!["is_disabled", "created_at", "name", "name"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// `field <op> value`. Comparing with [`Literal::Null`] via `Eq` / `Ne`
    /// is a null test.
    Compare {
        field: String,
        op: Op,
        value: Literal,
    },
    /// `field IN (values...)`.
    In { field: String, values: Vec<Literal> },
    /// `field IS NULL`.
    IsNull { field: String },
    /// `field IS NOT NULL`.
    IsNotNull { field: String },
    /// All nested conditions hold. Empty is true.
    And(Vec<Condition>),
    /// At least one nested condition holds. Empty is false.
    Or(Vec<Condition>),
    /// The nested condition does not hold.
    Not(Box<Condition>),
}

impl Condition {
    /// Builds a comparison condition.
    pub fn compare(field: impl Into<String>, op: Op, value: impl Into<Literal>) -> Self {
        Condition::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, Op::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, Op::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, Op::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, Op::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, Op::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, Op::Lte, value)
    }

    pub fn contains(field: impl Into<String>, text: &str) -> Self {
        Self::compare(field, Op::Contains, text)
    }

    pub fn starts_with(field: impl Into<String>, text: &str) -> Self {
        Self::compare(field, Op::StartsWith, text)
    }

    pub fn ends_with(field: impl Into<String>, text: &str) -> Self {
        Self::compare(field, Op::EndsWith, text)
    }

    /// `field IN (values...)`.
    pub fn is_in<I, L>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Condition::IsNull { field: field.into() }
    }

    pub fn is_not_null(field: impl Into<String>) -> Self {
        Condition::IsNotNull { field: field.into() }
    }

    /// Conjunction, flattening nested `And` nodes.
    pub fn and(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::And(mut left), Condition::And(right)) => {
                left.extend(right);
                Condition::And(left)
            }
            (Condition::And(mut left), right) => {
                left.push(right);
                Condition::And(left)
            }
            (left, right) => Condition::And(vec![left, right]),
        }
    }

    /// Disjunction, flattening nested `Or` nodes.
    pub fn or(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::Or(mut left), Condition::Or(right)) => {
                left.extend(right);
                Condition::Or(left)
            }
            (Condition::Or(mut left), right) => {
                left.push(right);
                Condition::Or(left)
            }
            (left, right) => Condition::Or(vec![left, right]),
        }
    }

    /// Negation.
    pub fn negate(self) -> Self {
        match self {
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }

    /// Returns `true` when the condition holds for `entity`.
    pub fn matches<T: Entity>(&self, entity: &T) -> bool {
        self.eval(entity) == Some(true)
    }

    /// Three-valued evaluation: `None` means unknown.
    pub fn eval<T: Entity>(&self, entity: &T) -> Option<bool> {
        match self {
            Condition::Compare { field, op, value } => {
                compare_field(entity.field(field), *op, value)
            }
            Condition::In { field, values } => {
                let v = entity.field(field);
                if v.is_null() {
                    return None;
                }
                Some(
                    values
                        .iter()
                        .any(|l| compare_values(v, l.as_value()) == Some(Ordering::Equal)),
                )
            }
            Condition::IsNull { field } => Some(entity.field(field).is_null()),
            Condition::IsNotNull { field } => Some(!entity.field(field).is_null()),
            Condition::And(children) => {
                let mut unknown = false;
                for child in children {
                    match child.eval(entity) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { None } else { Some(true) }
            }
            Condition::Or(children) => {
                let mut unknown = false;
                for child in children {
                    match child.eval(entity) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown { None } else { Some(false) }
            }
            Condition::Not(inner) => inner.eval(entity).map(|b| !b),
        }
    }

    /// Every field name referenced by this condition, in order of
    /// appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Compare { field, .. }
            | Condition::In { field, .. }
            | Condition::IsNull { field }
            | Condition::IsNotNull { field } => out.push(field),
            Condition::And(children) | Condition::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Condition::Not(inner) => inner.collect_fields(out),
        }
    }
}

fn compare_field(field: Value<'_>, op: Op, operand: &Literal) -> Option<bool> {
    if operand.is_null() {
        return match op {
            Op::Eq => Some(field.is_null()),
            Op::Ne => Some(!field.is_null()),
            _ => None,
        };
    }
    if field.is_null() {
        return None;
    }
    if op.is_text_op() {
        let (haystack, needle) = (field.as_str()?, operand.as_value().as_str()?);
        return Some(match op {
            Op::Contains => haystack.contains(needle),
            Op::StartsWith => haystack.starts_with(needle),
            _ => haystack.ends_with(needle),
        });
    }
    compare_values(field, operand.as_value()).map(|ordering| op.eval_ordering(ordering))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Member {
        name: String,
        level: i64,
        nickname: Option<String>,
        banned: bool,
    }

    impl Entity for Member {
        fn field(&self, name: &str) -> Value<'_> {
            match name {
                "name" => Value::Text(&self.name),
                "level" => Value::Integer(self.level),
                "nickname" => self.nickname.as_deref().map_or(Value::Null, Value::Text),
                "banned" => Value::Bool(self.banned),
                _ => Value::Null,
            }
        }
    }

    fn member() -> Member {
        Member {
            name: "ferris".into(),
            level: 12,
            nickname: None,
            banned: false,
        }
    }

    #[test]
    fn comparisons() {
        let m = member();
        assert!(Condition::eq("name", "ferris").matches(&m));
        assert!(Condition::gt("level", 10i64).matches(&m));
        assert!(!Condition::lt("level", 12i64).matches(&m));
        assert!(Condition::lte("level", 12.0).matches(&m));
        assert!(Condition::eq("banned", false).matches(&m));
    }

    #[test]
    fn text_operators_are_case_sensitive() {
        let m = member();
        assert!(Condition::contains("name", "rri").matches(&m));
        assert!(Condition::starts_with("name", "fer").matches(&m));
        assert!(Condition::ends_with("name", "ris").matches(&m));
        assert!(!Condition::contains("name", "RRI").matches(&m));
    }

    #[test]
    fn null_comparisons_are_unknown() {
        let m = member();
        assert_eq!(Condition::eq("nickname", "crab").eval(&m), None);
        assert_eq!(Condition::ne("nickname", "crab").eval(&m), None);
        assert!(!Condition::ne("nickname", "crab").matches(&m));
        // NOT(unknown) is still unknown.
        assert!(!Condition::eq("nickname", "crab").negate().matches(&m));
    }

    #[test]
    fn null_operand_is_a_null_test() {
        let m = member();
        assert!(Condition::eq("nickname", Literal::Null).matches(&m));
        assert!(Condition::ne("name", Literal::Null).matches(&m));
        assert!(Condition::is_null("nickname").matches(&m));
        assert!(Condition::is_not_null("name").matches(&m));
    }

    #[test]
    fn in_list() {
        let m = member();
        assert!(Condition::is_in("level", [1i64, 12, 30]).matches(&m));
        assert!(!Condition::is_in("level", Vec::<i64>::new()).matches(&m));
        assert_eq!(Condition::is_in("nickname", ["a"]).eval(&m), None);
    }

    #[test]
    fn three_valued_and_or() {
        let m = member();
        let unknown = Condition::eq("nickname", "x");
        assert_eq!(unknown.clone().and(Condition::eq("banned", true)).eval(&m), Some(false));
        assert_eq!(unknown.clone().and(Condition::eq("banned", false)).eval(&m), None);
        assert_eq!(unknown.clone().or(Condition::eq("banned", false)).eval(&m), Some(true));
        assert_eq!(unknown.or(Condition::eq("banned", true)).eval(&m), None);
        assert_eq!(Condition::And(vec![]).eval(&m), Some(true));
        assert_eq!(Condition::Or(vec![]).eval(&m), Some(false));
    }

    #[test]
    fn and_or_flatten() {
        let c = Condition::eq("a", 1i64)
            .and(Condition::eq("b", 2i64))
            .and(Condition::eq("c", 3i64));
        match c {
            Condition::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
        let n = Condition::eq("a", 1i64).negate().negate();
        assert_eq!(n, Condition::eq("a", 1i64));
    }
}
