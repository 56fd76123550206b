//! # quarry-store
//!
//! SQLite repository boundary for Quarry specifications.
//!
//! Specifications built with `quarry-spec` are composed onto a
//! [`SqlQueryable`], translated into parameterized SQL and materialized on
//! the blocking pool. Results can be kept in a second-level [`QueryCache`]
//! that writes invalidate per table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  ReadOnlyRepository / Repository        │
//! │  SqlRepository (async, instrumented)    │
//! ├─────────────────────────────────────────┤
//! │  SpecificationEvaluator → SqlQueryable  │
//! │  QueryCache (moka, per-entry expiry)    │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL + mmap)         │
//! │  Migrations (versioned, transactional)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use quarry_store::{Database, QueryCache, ReadOnlyRepository, SqlRepository, StoreConfig};
//!
//! let config = StoreConfig::load("quarry.toml")?;
//! let db = Database::open_with_config(&config, MIGRATIONS).await?;
//! let cache = QueryCache::new(&config.cache);
//! let guilds: SqlRepository<Guild> = SqlRepository::new(db, cache, &config);
//! let active = guilds.get_by_spec(&ActiveGuilds::spec()).await?;
//! ```

pub mod cache;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod migration;
pub mod pagination;
pub mod repository;
pub mod sql;

// ── re-exports ───────────────────────────────────────────────────────

pub use cache::{CacheSlot, CacheStats, QueryCache};
pub use config::{CacheConfig, PagingConfig, StoreConfig};
pub use db::Database;
pub use entity::SqlEntity;
pub use error::{StoreError, StoreResult};
pub use migration::Migration;
pub use pagination::{PageWindow, PaginationFilter};
pub use repository::{ReadOnlyRepository, Repository, SqlRepository};
pub use sql::{QueryPlan, SqlQueryable, SqlStatement};
