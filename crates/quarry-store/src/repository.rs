//! Repositories: the boundary where specifications meet the database.
//!
//! [`ReadOnlyRepository`] and [`Repository`] are the async contracts;
//! [`SqlRepository`] implements both over a [`Database`]. Reads compose the
//! specification onto a [`SqlQueryable`] through the evaluator pipeline,
//! consult the second-level cache, and materialize on the blocking pool.
//! Writes invalidate the entity's cached results.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use quarry_spec::{
    CacheMode, Literal, ProjectedSpecification, Queryable, Specification,
    SpecificationEvaluator,
};
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use tracing::{debug, instrument};

use crate::cache::{CacheSlot, QueryCache};
use crate::config::{PagingConfig, StoreConfig};
use crate::db::Database;
use crate::entity::{ensure_column, key_value, to_sql_value, SqlEntity};
use crate::error::{StoreError, StoreResult};
use crate::pagination::PaginationFilter;
use crate::sql::{QueryPlan, SqlQueryable};

// ═══════════════════════════════════════════════════════════════════════
//  Contracts
// ═══════════════════════════════════════════════════════════════════════

/// Read access to a set of `T`.
///
/// Not-found is `None` or an empty list, never an error.
#[async_trait]
pub trait ReadOnlyRepository<T: SqlEntity>: Send + Sync {
    /// First match of the full pipeline. Post-processing is not applied.
    async fn get_single_by_spec(&self, spec: &Specification<T>) -> StoreResult<Option<T>>;

    /// All matches of the full pipeline, post-processed.
    async fn get_by_spec(&self, spec: &Specification<T>) -> StoreResult<Vec<T>>;

    /// Like [`get_by_spec`](Self::get_by_spec); `filter` supplies skip and
    /// take only where `spec` leaves them unset.
    async fn get_by_spec_paged(
        &self,
        spec: &Specification<T>,
        filter: PaginationFilter,
    ) -> StoreResult<Vec<T>>;

    async fn get_single_projected<R>(
        &self,
        spec: &ProjectedSpecification<T, R>,
    ) -> StoreResult<Option<R>>
    where
        R: Send + 'static;

    async fn get_projected<R>(&self, spec: &ProjectedSpecification<T, R>) -> StoreResult<Vec<R>>
    where
        R: Send + 'static;

    /// Number of rows matching the criteria of `spec`; every row when `None`.
    async fn long_count(&self, spec: Option<&Specification<T>>) -> StoreResult<u64>;

    async fn any(&self, spec: &Specification<T>) -> StoreResult<bool>;

    async fn get_all(&self) -> StoreResult<Vec<T>>;
}

/// Read and write access to a set of `T`.
#[async_trait]
pub trait Repository<T: SqlEntity>: ReadOnlyRepository<T> {
    /// Inserts `item` and returns its rowid. A null key is left to SQLite.
    async fn add(&self, item: &T) -> StoreResult<i64>;

    /// Inserts all `items` in one transaction.
    async fn add_range(&self, items: &[T]) -> StoreResult<usize>;

    /// Overwrites the row with `item`'s key. `false` when no row matched.
    async fn update(&self, item: &T) -> StoreResult<bool>;

    /// Deletes the row with `item`'s key. `false` when no row matched.
    async fn delete(&self, item: &T) -> StoreResult<bool>;
}

// ═══════════════════════════════════════════════════════════════════════
//  SqlRepository
// ═══════════════════════════════════════════════════════════════════════

/// SQLite-backed repository of `T`.
pub struct SqlRepository<T> {
    db: Database,
    cache: QueryCache,
    evaluator: SpecificationEvaluator,
    paging: PagingConfig,
    cache_all_queries: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for SqlRepository<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            cache: self.cache.clone(),
            evaluator: self.evaluator.clone(),
            paging: self.paging.clone(),
            cache_all_queries: self.cache_all_queries,
            _entity: PhantomData,
        }
    }
}

impl<T: SqlEntity> SqlRepository<T> {
    /// Create a repository over `db` sharing `cache`.
    pub fn new(db: Database, cache: QueryCache, config: &StoreConfig) -> Self {
        Self {
            db,
            cache,
            evaluator: SpecificationEvaluator::new(),
            paging: config.paging.clone(),
            cache_all_queries: config.cache.cache_all_queries,
            _entity: PhantomData,
        }
    }

    /// Replace the evaluator, e.g. one carrying a mapping registry.
    pub fn with_evaluator(mut self, evaluator: SpecificationEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn evaluator(&self) -> &SpecificationEvaluator {
        &self.evaluator
    }

    /// The statement and annotations `spec` would run with.
    pub fn explain(&self, spec: &Specification<T>) -> StoreResult<QueryPlan> {
        self.evaluator
            .get_query(SqlQueryable::new(), spec, false)
            .explain()
    }

    fn compose(&self, spec: &Specification<T>) -> SqlQueryable<T> {
        self.evaluator.get_query(SqlQueryable::new(), spec, false)
    }

    fn cache_slot(&self, query: &SqlQueryable<T>) -> StoreResult<Option<CacheSlot>> {
        let enabled = match query.cache_policy().map_or(CacheMode::Default, |p| p.mode) {
            CacheMode::Enabled => true,
            CacheMode::Disabled => false,
            CacheMode::Default => self.cache_all_queries,
        };
        if !enabled {
            return Ok(None);
        }
        Ok(query
            .cache_key()?
            .map(|key| self.cache.slot(T::TABLE, key)))
    }

    /// Reads the query through the cache.
    async fn materialize(&self, query: SqlQueryable<T>) -> StoreResult<Vec<T>> {
        let slot = self.cache_slot(&query)?;
        if let Some(slot) = &slot {
            if let Some(items) = self.cache.get::<Vec<T>>(slot).await {
                return Ok(items);
            }
        }

        let (timeout, mode) = query
            .cache_policy()
            .map_or((None, None), |p| (p.timeout, p.expiration_mode));
        let items = self.db.execute(move |conn| query.fetch(conn)).await?;

        if let Some(slot) = &slot {
            self.cache.insert(slot, &items, timeout, mode).await?;
        }
        Ok(items)
    }

    async fn write<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let result = self.db.execute_mut(f).await?;
        self.cache.invalidate_table(T::TABLE);
        Ok(result)
    }
}

#[async_trait]
impl<T: SqlEntity> ReadOnlyRepository<T> for SqlRepository<T> {
    #[instrument(skip_all, fields(entity = T::TABLE))]
    async fn get_single_by_spec(&self, spec: &Specification<T>) -> StoreResult<Option<T>> {
        let query = self.compose(spec).take(1);
        Ok(self.materialize(query).await?.into_iter().next())
    }

    #[instrument(skip_all, fields(entity = T::TABLE))]
    async fn get_by_spec(&self, spec: &Specification<T>) -> StoreResult<Vec<T>> {
        let items = self.materialize(self.compose(spec)).await?;
        debug!(rows = items.len(), "specification materialized");
        Ok(match spec.post_processing() {
            Some(transform) => transform(items),
            None => items,
        })
    }

    #[instrument(skip_all, fields(entity = T::TABLE, page = filter.page))]
    async fn get_by_spec_paged(
        &self,
        spec: &Specification<T>,
        filter: PaginationFilter,
    ) -> StoreResult<Vec<T>> {
        let window = filter.window(&self.paging);
        let spec = spec.with_default_paging(Some(window.skip), Some(window.take));
        self.get_by_spec(&spec).await
    }

    #[instrument(skip_all, fields(entity = T::TABLE))]
    async fn get_single_projected<R>(
        &self,
        spec: &ProjectedSpecification<T, R>,
    ) -> StoreResult<Option<R>>
    where
        R: Send + 'static,
    {
        let (query, projector, _) = self
            .evaluator
            .get_projected_query(SqlQueryable::new(), spec, false)?
            .into_parts();
        let items = self.materialize(query.take(1)).await?;
        Ok(items.first().map(|item| projector(item)))
    }

    #[instrument(skip_all, fields(entity = T::TABLE))]
    async fn get_projected<R>(&self, spec: &ProjectedSpecification<T, R>) -> StoreResult<Vec<R>>
    where
        R: Send + 'static,
    {
        let (query, projector, _) = self
            .evaluator
            .get_projected_query(SqlQueryable::new(), spec, false)?
            .into_parts();
        let mut items = self.materialize(query).await?;
        if let Some(transform) = spec.base().post_processing() {
            items = transform(items);
        }
        let projected: Vec<R> = items.iter().map(|item| projector(item)).collect();
        Ok(match spec.post_processing() {
            Some(transform) => transform(projected),
            None => projected,
        })
    }

    #[instrument(skip_all, fields(entity = T::TABLE))]
    async fn long_count(&self, spec: Option<&Specification<T>>) -> StoreResult<u64> {
        let query = match spec {
            Some(spec) => self.evaluator.get_query(SqlQueryable::new(), spec, true),
            None => SqlQueryable::new(),
        };
        let count = self.db.execute(move |conn| query.count(conn)).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[instrument(skip_all, fields(entity = T::TABLE))]
    async fn any(&self, spec: &Specification<T>) -> StoreResult<bool> {
        let query = self.evaluator.get_query(SqlQueryable::new(), spec, true);
        self.db.execute(move |conn| query.exists(conn)).await
    }

    #[instrument(skip_all, fields(entity = T::TABLE))]
    async fn get_all(&self) -> StoreResult<Vec<T>> {
        self.materialize(SqlQueryable::new()).await
    }
}

#[async_trait]
impl<T: SqlEntity> Repository<T> for SqlRepository<T> {
    #[instrument(skip_all, fields(entity = T::TABLE))]
    async fn add(&self, item: &T) -> StoreResult<i64> {
        let (sql, params) = insert_statement::<T>(item.to_values())?;
        let rowid = self
            .write(move |conn| {
                conn.execute(&sql, params_from_iter(params))?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        debug!(rowid, "row inserted");
        Ok(rowid)
    }

    #[instrument(skip_all, fields(entity = T::TABLE, rows = items.len()))]
    async fn add_range(&self, items: &[T]) -> StoreResult<usize> {
        let statements = items
            .iter()
            .map(|item| insert_statement::<T>(item.to_values()))
            .collect::<StoreResult<Vec<_>>>()?;
        self.write(move |conn| {
            let tx = conn.transaction()?;
            for (sql, params) in &statements {
                tx.execute(sql, params_from_iter(params.iter()))?;
            }
            tx.commit()?;
            Ok(statements.len())
        })
        .await
    }

    #[instrument(skip_all, fields(entity = T::TABLE))]
    async fn update(&self, item: &T) -> StoreResult<bool> {
        let key = key_value(item)?;
        let values = item.to_values();
        let mut assignments = Vec::with_capacity(T::COLUMNS.len());
        let mut params = Vec::with_capacity(T::COLUMNS.len());
        for (column, value) in T::COLUMNS.iter().zip(values.iter()) {
            if *column != T::KEY {
                assignments.push(format!("{column} = ?"));
                params.push(to_sql_value(value));
            }
        }
        if assignments.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "{} has no columns besides its key",
                T::TABLE
            )));
        }
        params.push(to_sql_value(&key));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            T::TABLE,
            assignments.join(", "),
            ensure_column::<T>(T::KEY)?
        );
        let changed = self
            .write(move |conn| Ok(conn.execute(&sql, params_from_iter(params))?))
            .await?;
        Ok(changed > 0)
    }

    #[instrument(skip_all, fields(entity = T::TABLE))]
    async fn delete(&self, item: &T) -> StoreResult<bool> {
        let key = to_sql_value(&key_value(item)?);
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            T::TABLE,
            ensure_column::<T>(T::KEY)?
        );
        let changed = self
            .write(move |conn| Ok(conn.execute(&sql, [key])?))
            .await?;
        Ok(changed > 0)
    }
}

impl<T> fmt::Debug for SqlRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlRepository")
            .field("entity", &std::any::type_name::<T>())
            .field("cache", &self.cache)
            .field("paging", &self.paging)
            .field("cache_all_queries", &self.cache_all_queries)
            .finish()
    }
}

/// `INSERT` for one row. A null key column is omitted so SQLite assigns it.
fn insert_statement<T: SqlEntity>(values: Vec<Literal>) -> StoreResult<(String, Vec<SqlValue>)> {
    if values.len() != T::COLUMNS.len() {
        return Err(StoreError::InvalidArgument(format!(
            "{} expects {} values, got {}",
            T::TABLE,
            T::COLUMNS.len(),
            values.len()
        )));
    }

    let mut columns = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len());
    for (column, value) in T::COLUMNS.iter().zip(values) {
        if *column == T::KEY && value.is_null() {
            continue;
        }
        columns.push(*column);
        params.push(to_sql_value(&value));
    }

    let sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", T::TABLE)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            T::TABLE,
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        )
    };
    Ok((sql, params))
}
