//! Second-level query cache using [`moka`].
//!
//! Materialized query results are stored as JSON so any entity type can share
//! one cache. Each entry carries its own lifetime: absolute entries expire a
//! fixed time after insertion, sliding entries have their lifetime renewed on
//! every read.
//!
//! Writes invalidate by table. Every table has a generation counter; a
//! [`CacheSlot`] captures the generation before the query runs, and an entry
//! stored under an older generation is never served.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use moka::future::Cache;
use moka::Expiry;
use quarry_spec::ExpirationMode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::StoreResult;

// ── cache stats ──────────────────────────────────────────────────────

/// Counters tracking cache effectiveness.
#[derive(Debug)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Table invalidations since creation.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Total lookups (hits + misses).
    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Hit rate as a value between 0.0 and 1.0 (returns 0.0 if no lookups).
    pub fn hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.hits() as f64 / total as f64
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} total={} rate={:.2}% invalidations={}",
            self.hits(),
            self.misses(),
            self.total(),
            self.hit_rate() * 100.0,
            self.invalidations(),
        )
    }
}

// ── entries ──────────────────────────────────────────────────────────

#[derive(Clone)]
struct CachedEntry {
    table: &'static str,
    generation: u64,
    json: Arc<str>,
    ttl: Duration,
    mode: ExpirationMode,
}

/// Per-entry lifetime.
struct EntryExpiry;

impl Expiry<String, CachedEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CachedEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_read(
        &self,
        _key: &String,
        entry: &CachedEntry,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        match entry.mode {
            ExpirationMode::Sliding => Some(entry.ttl),
            ExpirationMode::Absolute => duration_until_expiry,
        }
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CachedEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Where a query result lives in the cache, pinned to the table generation
/// observed when the slot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSlot {
    table: &'static str,
    key: String,
    entry: String,
    generation: u64,
}

impl CacheSlot {
    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

// ── query cache ──────────────────────────────────────────────────────

/// A shared, async-aware cache of materialized query results.
#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<String, CachedEntry>,
    generations: Arc<DashMap<&'static str, u64>>,
    stats: Arc<CacheStats>,
    default_timeout: Duration,
    default_mode: ExpirationMode,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(EntryExpiry)
            .build();

        debug!(
            max_capacity = config.max_capacity,
            default_timeout_secs = config.default_timeout_secs,
            expiration_mode = ?config.expiration_mode,
            "query cache created"
        );

        Self {
            inner,
            generations: Arc::new(DashMap::new()),
            stats: Arc::new(CacheStats::new()),
            default_timeout: config.default_timeout(),
            default_mode: config.expiration_mode,
        }
    }

    /// Takes a slot for `key` under the current generation of `table`.
    ///
    /// Take the slot before reading the database so a write that lands in
    /// between makes the eventual insert stale.
    /// Keys are scoped to `table`; equal keys for different tables never
    /// share an entry.
    pub fn slot(&self, table: &'static str, key: impl Into<String>) -> CacheSlot {
        let key = key.into();
        CacheSlot {
            table,
            entry: format!("{table}|{key}"),
            key,
            generation: self.generation(table),
        }
    }

    /// Current generation of `table`.
    pub fn generation(&self, table: &'static str) -> u64 {
        self.generations.get(table).map_or(0, |g| *g.value())
    }

    /// Looks up a cached result. Stale and corrupt entries count as misses.
    pub async fn get<V: DeserializeOwned>(&self, slot: &CacheSlot) -> Option<V> {
        let Some(entry) = self.inner.get(&slot.entry).await else {
            self.stats.record_miss();
            debug!(table = slot.table, key = %slot.key, "cache miss");
            return None;
        };

        if entry.generation != self.generation(entry.table) {
            self.inner.invalidate(&slot.entry).await;
            self.stats.record_miss();
            debug!(table = entry.table, key = %slot.key, "stale cache entry evicted");
            return None;
        }

        match serde_json::from_str::<V>(&entry.json) {
            Ok(value) => {
                self.stats.record_hit();
                debug!(table = entry.table, key = %slot.key, "cache hit");
                Some(value)
            }
            Err(err) => {
                warn!(
                    table = entry.table,
                    key = %slot.key,
                    %err,
                    "cache entry deserialization failed, evicting"
                );
                self.inner.invalidate(&slot.entry).await;
                self.stats.record_miss();
                None
            }
        }
    }

    /// Stores `value` in `slot`. `timeout` and `mode` fall back to the
    /// configured defaults. A slot taken before the last invalidation of its
    /// table is dropped silently.
    pub async fn insert<V: Serialize + ?Sized>(
        &self,
        slot: &CacheSlot,
        value: &V,
        timeout: Option<Duration>,
        mode: Option<ExpirationMode>,
    ) -> StoreResult<()> {
        if slot.generation != self.generation(slot.table) {
            debug!(table = slot.table, key = %slot.key, "skipping insert for stale slot");
            return Ok(());
        }

        let json = serde_json::to_string(value)?;
        let entry = CachedEntry {
            table: slot.table,
            generation: slot.generation,
            json: Arc::from(json),
            ttl: timeout.unwrap_or(self.default_timeout),
            mode: mode.unwrap_or(self.default_mode),
        };
        debug!(
            table = slot.table,
            key = %slot.key,
            ttl_ms = entry.ttl.as_millis() as u64,
            mode = ?entry.mode,
            "cache insert"
        );
        self.inner.insert(slot.entry.clone(), entry).await;
        Ok(())
    }

    /// Makes every entry cached for `table` stale.
    pub fn invalidate_table(&self, table: &'static str) {
        let mut generation = self.generations.entry(table).or_insert(0);
        *generation += 1;
        self.stats.record_invalidation();
        debug!(table, generation = *generation, "cache table invalidated");
    }

    /// Remove all entries from the cache.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
        debug!("cache invalidate_all");
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Approximate number of live entries. Call
    /// [`run_pending_tasks`](Self::run_pending_tasks) first for an exact
    /// count.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.entry_count())
            .field("default_timeout", &self.default_timeout)
            .field("default_mode", &self.default_mode)
            .field("stats", &self.stats.to_string())
            .finish()
    }
}

// ── tests ────────────────────────────────────────────────────────────
