//! Field values and query operands.
//!
//! [`Value`] borrows a field out of an entity at evaluation time;
//! [`Literal`] owns its data so it can live inside a specification, be bound
//! as a statement parameter, or serve as an extracted sort/group key.
//!
//! Integers, floats and timestamps compare numerically with one another.
//! For sorting, [`Literal::sort_cmp`] adds a total order across types:
//!
//! ```text
//! Null, NaN < numbers (Integer / Float / Timestamp) < Text < Bool
//! ```
//!
//! NaN sorts with null, matching SQLite, which stores NaN as NULL.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entity access
// ---------------------------------------------------------------------------

/// A type whose named fields can be read by the query engine.
///
/// Structured conditions, field-based order keys, group keys and search
/// selectors resolve through [`Entity::field`] on the in-memory path.
///
/// ```
/// use quarry_spec::{Entity, Value};
///
/// struct Guild {
///     id: i64,
///     name: String,
/// }
///
/// impl Entity for Guild {
///     fn field(&self, name: &str) -> Value<'_> {
///         match name {
///             "id" => Value::Integer(self.id),
///             "name" => Value::Text(&self.name),
///             _ => Value::Null,
///         }
///     }
/// }
/// ```
pub trait Entity: Send + Sync + 'static {
    /// Returns the value of a field, or [`Value::Null`] when the field is
    /// unknown or empty.
    fn field(&self, name: &str) -> Value<'_>;
}

// ---------------------------------------------------------------------------
// Borrowed value
// ---------------------------------------------------------------------------

/// Runtime value of an entity field, borrowed from the entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// Text value.
    Text(&'a str),
    /// Signed integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// Missing or null field.
    Null,
}

impl<'a> Value<'a> {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Extracts the text, if this is a text value.
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Copies this value into an owned [`Literal`].
    pub fn to_literal(&self) -> Literal {
        match *self {
            Value::Text(s) => Literal::Text(s.to_string()),
            Value::Integer(i) => Literal::Integer(i),
            Value::Float(f) => Literal::Float(f),
            Value::Bool(b) => Literal::Bool(b),
            Value::Timestamp(t) => Literal::Timestamp(t),
            Value::Null => Literal::Null,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) | Value::Float(_) | Value::Timestamp(_) => 1,
            Value::Text(_) => 2,
            Value::Bool(_) => 3,
        }
    }
}

fn sort_rank(value: Value<'_>) -> u8 {
    match value {
        Value::Float(f) if f.is_nan() => 0,
        other => other.rank(),
    }
}

/// Compares two values of compatible types.
///
/// Returns `None` when either side is null or the types cannot be compared
/// (text against a number, a NaN float, ...).
pub fn compare_values(a: Value<'_>, b: Value<'_>) -> Option<Ordering> {
    match (a, b) {
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(&y)),
        (
            Value::Integer(x) | Value::Timestamp(x),
            Value::Integer(y) | Value::Timestamp(y),
        ) => Some(x.cmp(&y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(&y),
        (Value::Float(x), Value::Integer(y) | Value::Timestamp(y)) => {
            cmp_int_float(y, x).map(Ordering::reverse)
        }
        (Value::Integer(x) | Value::Timestamp(x), Value::Float(y)) => cmp_int_float(x, y),
        _ => None,
    }
}

/// Exact comparison of an integer with a float; `None` for NaN.
fn cmp_int_float(i: i64, f: f64) -> Option<Ordering> {
    // 2^63, the first float above i64::MAX.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return None;
    }
    if f >= LIMIT {
        return Some(Ordering::Less);
    }
    if f < -LIMIT {
        return Some(Ordering::Greater);
    }
    let whole = f.trunc();
    // Same integer part: the fraction decides.
    Some(i.cmp(&(whole as i64)).then_with(|| 0.0_f64.total_cmp(&(f - whole))))
}

// ---------------------------------------------------------------------------
// Owned literal
// ---------------------------------------------------------------------------

/// Owned scalar used as a condition operand, parameter or extracted key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
}

impl Literal {
    /// Borrows this literal as a [`Value`].
    pub fn as_value(&self) -> Value<'_> {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Text(s) => Value::Text(s),
            Literal::Timestamp(t) => Value::Timestamp(*t),
        }
    }

    /// Returns `true` for [`Literal::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// Total order used for sorting and grouping.
    ///
    /// The type rank decides first, with NaN ranked as null. Values of the
    /// same rank use [`compare_values`].
    pub fn sort_cmp(&self, other: &Literal) -> Ordering {
        let (a, b) = (self.as_value(), other.as_value());
        sort_rank(a)
            .cmp(&sort_rank(b))
            .then_with(|| compare_values(a, b).unwrap_or(Ordering::Equal))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Text(s) => write!(f, "{s:?}"),
            Literal::Timestamp(t) => write!(f, "@{t}"),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Text(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Text(s)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Integer(i64::from(n))
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Integer(n)
    }
}

impl From<u32> for Literal {
    fn from(n: u32) -> Self {
        Literal::Integer(i64::from(n))
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Float(n)
    }
}

impl From<DateTime<Utc>> for Literal {
    fn from(ts: DateTime<Utc>) -> Self {
        Literal::Timestamp(ts.timestamp_millis())
    }
}

impl<L: Into<Literal>> From<Option<L>> for Literal {
    fn from(value: Option<L>) -> Self {
        value.map_or(Literal::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
