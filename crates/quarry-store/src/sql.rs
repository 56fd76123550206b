//! Translation of composed queries into SQLite statements.
//!
//! [`SqlQueryable`] implements [`Queryable`] by recording every composed term.
//! Nothing is translated until the query is materialized: native closure
//! terms, unknown columns and unknown navigations surface as [`StoreError`]s
//! at that point.
//!
//! ```text
//! SELECT <COLUMNS> FROM <TABLE>
//!  WHERE <query filter> AND <where terms> AND (<search group 1>) AND ...
//!  ORDER BY <order terms>, <key>
//!  LIMIT ? OFFSET ?
//! ```
//!
//! Includes are loaded per path after the root rows are read, and grouping
//! runs over the fetched page.

use std::fmt;
use std::marker::PhantomData;

use quarry_spec::{
    group_stable, search_groups, CacheMode, CachePolicy, Condition, IncludePath, Literal, Op,
    OrderTerm, Predicate, Queryable, SearchTerm, Selector, TrackingMode,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, trace};

use crate::entity::{column_list, ensure_column, to_sql_value, SqlEntity};
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Statements and plans
// ═══════════════════════════════════════════════════════════════════════

/// A parameterized SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Literal>,
}

impl SqlStatement {
    /// Parameters converted for binding.
    pub fn bind(&self) -> Vec<SqlValue> {
        self.params.iter().map(to_sql_value).collect()
    }
}

/// What a query will do when materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub entity: &'static str,
    pub sql: String,
    pub params: Vec<Literal>,
    pub includes: Vec<String>,
    pub tracking: TrackingMode,
    pub split_query: bool,
    pub ignore_query_filters: bool,
    /// Field name of the grouping key, or `<native>`.
    pub group_by: Option<String>,
    pub cache_mode: CacheMode,
    pub cache_key: Option<String>,
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
            writeln!(f, "  params: [{}]", params.join(", "))?;
        }
        if !self.includes.is_empty() {
            writeln!(f, "  includes: {}", self.includes.join(", "))?;
        }
        if let Some(group) = &self.group_by {
            writeln!(f, "  group by: {group}")?;
        }
        write!(
            f,
            "  tracking: {:?}, split: {}, cache: {:?}",
            self.tracking, self.split_query, self.cache_mode
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  SqlQueryable
// ═══════════════════════════════════════════════════════════════════════

/// A lazily composed SQLite query over `T`.
pub struct SqlQueryable<T> {
    filters: Vec<Predicate<T>>,
    search: Vec<Vec<SearchTerm<T>>>,
    includes: Vec<IncludePath>,
    order: Vec<OrderTerm<T>>,
    offset: usize,
    limit: Option<usize>,
    tracking: TrackingMode,
    split_query: bool,
    ignore_query_filters: bool,
    group_by: Option<Selector<T>>,
    cache: Option<CachePolicy>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: SqlEntity> Default for SqlQueryable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SqlEntity> SqlQueryable<T> {
    /// A query over every row of `T::TABLE`.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            search: Vec::new(),
            includes: Vec::new(),
            order: Vec::new(),
            offset: 0,
            limit: None,
            tracking: TrackingMode::Tracking,
            split_query: false,
            ignore_query_filters: false,
            group_by: None,
            cache: None,
            _entity: PhantomData,
        }
    }

    pub fn includes(&self) -> &[IncludePath] {
        &self.includes
    }

    pub fn tracking(&self) -> TrackingMode {
        self.tracking
    }

    pub fn is_split_query(&self) -> bool {
        self.split_query
    }

    /// The explicit cache choice, `None` when the store's default applies.
    pub fn cache_policy(&self) -> Option<&CachePolicy> {
        self.cache.as_ref()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    // ── translation ──────────────────────────────────────────────────

    /// The row-selecting statement.
    pub fn to_statement(&self) -> StoreResult<SqlStatement> {
        let mut params = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", column_list::<T>(), T::TABLE);

        if let Some(clause) = self.where_clause(&mut params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        if let Some(clause) = self.order_clause()? {
            sql.push_str(" ORDER BY ");
            sql.push_str(&clause);
        }
        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ?");
                params.push(Literal::Integer(to_i64(limit)));
                if offset > 0 {
                    sql.push_str(" OFFSET ?");
                    params.push(Literal::Integer(to_i64(offset)));
                }
            }
            (None, 0) => {}
            (None, offset) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(Literal::Integer(to_i64(offset)));
            }
        }

        Ok(SqlStatement { sql, params })
    }

    /// `COUNT(*)` over the filtered set. Ordering and paging are ignored.
    pub fn count_statement(&self) -> StoreResult<SqlStatement> {
        let mut params = Vec::new();
        let mut sql = format!("SELECT COUNT(*) FROM {}", T::TABLE);
        if let Some(clause) = self.where_clause(&mut params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        Ok(SqlStatement { sql, params })
    }

    /// `EXISTS` over the filtered set.
    pub fn exists_statement(&self) -> StoreResult<SqlStatement> {
        let mut params = Vec::new();
        let mut sql = format!("SELECT EXISTS(SELECT 1 FROM {}", T::TABLE);
        if let Some(clause) = self.where_clause(&mut params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        sql.push(')');
        Ok(SqlStatement { sql, params })
    }

    /// Translates the query without running it.
    pub fn explain(&self) -> StoreResult<QueryPlan> {
        let statement = self.to_statement()?;
        Ok(QueryPlan {
            entity: T::TABLE,
            sql: statement.sql,
            params: statement.params,
            includes: self.includes.iter().map(ToString::to_string).collect(),
            tracking: self.tracking,
            split_query: self.split_query,
            ignore_query_filters: self.ignore_query_filters,
            group_by: self
                .group_by
                .as_ref()
                .map(|s| s.field_name().unwrap_or("<native>").to_string()),
            cache_mode: self.cache.as_ref().map_or(CacheMode::Default, |c| c.mode),
            cache_key: self.cache.as_ref().and_then(|c| c.key.clone()),
        })
    }

    /// Cache key for this query, unique within its table.
    ///
    /// An explicit key names the criteria; the paging window, includes and
    /// grouping are appended so reads of different pages never share an
    /// entry. Without an explicit key the translated statement is used.
    /// `None` when the result depends on a native grouping closure and no
    /// explicit key names it.
    pub fn cache_key(&self) -> StoreResult<Option<String>> {
        let includes: Vec<String> = self.includes.iter().map(ToString::to_string).collect();
        let group = match &self.group_by {
            None => "",
            Some(Selector::Field(name)) => name.as_str(),
            Some(Selector::Native(_)) => "<native>",
        };

        if let Some(key) = self.cache.as_ref().and_then(|c| c.key.as_deref()) {
            let limit = self.limit.map_or_else(|| "all".to_string(), |l| l.to_string());
            return Ok(Some(format!(
                "{key}|offset={}|limit={limit}|include={}|group={group}",
                self.offset,
                includes.join(","),
            )));
        }
        if matches!(self.group_by, Some(Selector::Native(_))) {
            return Ok(None);
        }

        let statement = self.to_statement()?;
        let params: Vec<String> = statement.params.iter().map(ToString::to_string).collect();
        Ok(Some(format!(
            "{}|{}|include={}|group={group}",
            statement.sql,
            params.join(","),
            includes.join(","),
        )))
    }

    // ── materialization ──────────────────────────────────────────────

    /// Runs the query on `conn`, loads includes and applies grouping.
    pub fn fetch(&self, conn: &Connection) -> StoreResult<Vec<T>> {
        let statement = self.to_statement()?;
        debug!(
            entity = T::TABLE,
            sql = %statement.sql,
            params = statement.params.len(),
            "executing query"
        );

        let mut stmt = conn.prepare(&statement.sql)?;
        let mut items = stmt
            .query_map(params_from_iter(statement.bind()), |row| T::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;

        for path in &self.includes {
            trace!(entity = T::TABLE, path = %path, "loading navigation");
            T::load_navigation(conn, &mut items, path)?;
        }

        if let Some(selector) = &self.group_by {
            items = group_stable(items, |item| selector.extract(item));
        }
        Ok(items)
    }

    /// Counts the filtered rows on `conn`.
    pub fn count(&self, conn: &Connection) -> StoreResult<i64> {
        let statement = self.count_statement()?;
        debug!(entity = T::TABLE, sql = %statement.sql, "counting rows");
        let count = conn.query_row(&statement.sql, params_from_iter(statement.bind()), |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// `true` when at least one row passes the filters.
    pub fn exists(&self, conn: &Connection) -> StoreResult<bool> {
        let statement = self.exists_statement()?;
        let exists = conn.query_row(&statement.sql, params_from_iter(statement.bind()), |row| {
            row.get(0)
        })?;
        Ok(exists)
    }

    // ── clause builders ──────────────────────────────────────────────

    fn where_clause(&self, params: &mut Vec<Literal>) -> StoreResult<Option<String>> {
        let mut parts = Vec::new();

        if !self.ignore_query_filters {
            if let Some(filter) = T::query_filter() {
                parts.push(translate::<T>(&filter, params)?);
            }
        }

        for predicate in &self.filters {
            match predicate {
                Predicate::Condition(condition) => parts.push(translate::<T>(condition, params)?),
                Predicate::Native(_) => {
                    return Err(StoreError::Untranslatable {
                        entity: T::TABLE,
                        term: "where predicate",
                    });
                }
            }
        }

        for batch in &self.search {
            for terms in search_groups(batch).into_values() {
                let mut alternatives = Vec::with_capacity(terms.len());
                for term in terms {
                    let column = selector_column::<T>(&term.selector, "search selector")?;
                    params.push(Literal::Text(term.pattern.clone()));
                    alternatives.push(format!("{column} LIKE ?"));
                }
                parts.push(format!("({})", alternatives.join(" OR ")));
            }
        }

        Ok((!parts.is_empty()).then(|| parts.join(" AND ")))
    }

    fn order_clause(&self) -> StoreResult<Option<String>> {
        let paged = self.limit.is_some() || self.offset > 0;
        if self.order.is_empty() && !paged {
            return Ok(None);
        }

        let mut keys = Vec::with_capacity(self.order.len() + 1);
        let mut has_key = false;
        for term in &self.order {
            let column = selector_column::<T>(&term.selector, "order key")?;
            has_key |= column == T::KEY;
            let direction = if term.kind.is_descending() { "DESC" } else { "ASC" };
            keys.push(format!("{column} {direction}"));
        }
        // Ties fall back to key order so pages are deterministic.
        if !has_key {
            keys.push(format!("{} ASC", ensure_column::<T>(T::KEY)?));
        }
        Ok(Some(keys.join(", ")))
    }
}

impl<T: SqlEntity> Queryable<T> for SqlQueryable<T> {
    fn filter(mut self, predicate: Predicate<T>) -> Self {
        self.filters.push(predicate);
        self
    }

    fn search(mut self, terms: Vec<SearchTerm<T>>) -> Self {
        if !terms.is_empty() {
            self.search.push(terms);
        }
        self
    }

    fn include(mut self, path: IncludePath) -> Self {
        if !self.includes.contains(&path) {
            self.includes.push(path);
        }
        self
    }

    fn order_by(mut self, term: OrderTerm<T>) -> Self {
        if term.kind.is_primary() {
            self.order.clear();
        }
        self.order.push(term);
        self
    }

    fn skip(mut self, n: usize) -> Self {
        self.offset = self.offset.saturating_add(n);
        self.limit = self.limit.map(|limit| limit.saturating_sub(n));
        self
    }

    fn take(mut self, n: usize) -> Self {
        self.limit = Some(self.limit.map_or(n, |limit| limit.min(n)));
        self
    }

    fn with_tracking(mut self, mode: TrackingMode) -> Self {
        self.tracking = mode;
        self
    }

    fn split_query(mut self) -> Self {
        self.split_query = true;
        self
    }

    fn ignore_query_filters(mut self) -> Self {
        self.ignore_query_filters = true;
        self
    }

    fn group_by(mut self, selector: Selector<T>) -> Self {
        self.group_by = Some(selector);
        self
    }

    fn cacheable(mut self, policy: CachePolicy) -> Self {
        self.cache = Some(policy);
        self
    }
}

impl<T> fmt::Debug for SqlQueryable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlQueryable")
            .field("filters", &self.filters)
            .field("search", &self.search)
            .field("includes", &self.includes)
            .field("order", &self.order)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("tracking", &self.tracking)
            .field("split_query", &self.split_query)
            .field("ignore_query_filters", &self.ignore_query_filters)
            .field("group_by", &self.group_by)
            .field("cache", &self.cache)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Condition translation
// ═══════════════════════════════════════════════════════════════════════

/// Translates `condition` into a SQL boolean expression, appending bound
/// parameters to `params`.
///
/// Text operators use `instr` / `substr` so matching stays case-sensitive,
/// like the in-memory evaluation.
pub fn translate<T: SqlEntity>(
    condition: &Condition,
    params: &mut Vec<Literal>,
) -> StoreResult<String> {
    Ok(match condition {
        Condition::Compare { field, op, value } => {
            let column = ensure_column::<T>(field)?;
            if value.is_null() {
                return Ok(match op {
                    Op::Eq => format!("{column} IS NULL"),
                    Op::Ne => format!("{column} IS NOT NULL"),
                    _ => "NULL".to_string(),
                });
            }
            match op {
                Op::Contains => {
                    params.push(value.clone());
                    format!("instr({column}, ?) > 0")
                }
                Op::StartsWith => {
                    params.push(value.clone());
                    format!("instr({column}, ?) = 1")
                }
                Op::EndsWith => {
                    params.push(value.clone());
                    params.push(value.clone());
                    format!("substr({column}, length({column}) - length(?) + 1) = ?")
                }
                _ => {
                    params.push(value.clone());
                    format!("{column} {} ?", comparison(*op))
                }
            }
        }
        Condition::In { field, values } => {
            let column = ensure_column::<T>(field)?;
            if values.is_empty() {
                return Ok("0".to_string());
            }
            params.extend(values.iter().cloned());
            let placeholders = vec!["?"; values.len()].join(", ");
            format!("{column} IN ({placeholders})")
        }
        Condition::IsNull { field } => format!("{} IS NULL", ensure_column::<T>(field)?),
        Condition::IsNotNull { field } => format!("{} IS NOT NULL", ensure_column::<T>(field)?),
        Condition::And(children) => join::<T>(children, " AND ", "1", params)?,
        Condition::Or(children) => join::<T>(children, " OR ", "0", params)?,
        Condition::Not(inner) => format!("NOT ({})", translate::<T>(inner, params)?),
    })
}

fn join<T: SqlEntity>(
    children: &[Condition],
    separator: &str,
    empty: &str,
    params: &mut Vec<Literal>,
) -> StoreResult<String> {
    if children.is_empty() {
        return Ok(empty.to_string());
    }
    let parts = children
        .iter()
        .map(|child| translate::<T>(child, params))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(format!("({})", parts.join(separator)))
}

fn comparison(op: Op) -> &'static str {
    match op {
        Op::Eq => "=",
        Op::Ne => "<>",
        Op::Gt => ">",
        Op::Gte => ">=",
        Op::Lt => "<",
        Op::Lte => "<=",
        Op::Contains | Op::StartsWith | Op::EndsWith => "=",
    }
}

fn selector_column<T: SqlEntity>(
    selector: &Selector<T>,
    term: &'static str,
) -> StoreResult<&'static str> {
    match selector {
        Selector::Field(name) => ensure_column::<T>(name),
        Selector::Native(_) => Err(StoreError::Untranslatable {
            entity: T::TABLE,
            term,
        }),
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

// ── tests ────────────────────────────────────────────────────────────
