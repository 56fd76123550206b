//! Mapping between entities and SQLite tables.

use quarry_spec::{Condition, Entity, IncludePath, Literal};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// An entity persisted in one SQLite table.
///
/// `COLUMNS` is the full, ordered column list: `from_row` reads a row selected
/// in that order and `to_values` returns values in that order. Every field
/// name a translated term refers to must appear in `COLUMNS`.
///
/// Serde bounds let query results pass through the second-level cache.
pub trait SqlEntity: Entity + Serialize + DeserializeOwned {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];
    /// Primary key column. Must be one of `COLUMNS`.
    const KEY: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn to_values(&self) -> Vec<Literal>;

    /// Filter applied to every query unless the specification ignores query
    /// filters (soft deletes, tenant scoping, ...).
    fn query_filter() -> Option<Condition> {
        None
    }

    /// Loads the navigation `path` into `items`.
    ///
    /// Called once per include path after the root rows are read.
    fn load_navigation(
        _conn: &Connection,
        _items: &mut [Self],
        path: &IncludePath,
    ) -> StoreResult<()> {
        Err(StoreError::UnknownNavigation {
            entity: Self::TABLE,
            path: path.to_string(),
        })
    }
}

/// Resolves `name` to a declared column of `T`.
pub fn ensure_column<T: SqlEntity>(name: &str) -> StoreResult<&'static str> {
    T::COLUMNS
        .iter()
        .copied()
        .find(|column| *column == name)
        .ok_or_else(|| StoreError::UnknownColumn {
            entity: T::TABLE,
            column: name.to_string(),
        })
}

/// Comma-separated column list in declaration order.
pub fn column_list<T: SqlEntity>() -> String {
    T::COLUMNS.join(", ")
}

/// The primary-key value of `item`.
pub fn key_value<T: SqlEntity>(item: &T) -> StoreResult<Literal> {
    let index = T::COLUMNS
        .iter()
        .position(|column| *column == T::KEY)
        .ok_or_else(|| StoreError::UnknownColumn {
            entity: T::TABLE,
            column: T::KEY.to_string(),
        })?;
    item.to_values()
        .into_iter()
        .nth(index)
        .ok_or_else(|| {
            StoreError::InvalidArgument(format!(
                "{} returned fewer values than declared columns",
                T::TABLE
            ))
        })
}

/// Converts a literal into a bindable SQLite value. Booleans bind as 0/1 and
/// timestamps as epoch milliseconds.
pub fn to_sql_value(literal: &Literal) -> SqlValue {
    match literal {
        Literal::Null => SqlValue::Null,
        Literal::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Literal::Integer(i) | Literal::Timestamp(i) => SqlValue::Integer(*i),
        Literal::Float(f) => SqlValue::Real(*f),
        Literal::Text(s) => SqlValue::Text(s.clone()),
    }
}
