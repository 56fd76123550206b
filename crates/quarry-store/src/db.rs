//! SQLite database handle.
//!
//! [`Database`] owns one `rusqlite::Connection` behind an `Arc<Mutex<_>>`.
//! Every async entry point hops onto the blocking pool with
//! `tokio::task::spawn_blocking`, so repositories never block the runtime
//! while SQLite works.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::migration::{self, Migration};

/// Connection settings applied to every handle, in order.
///
/// WAL with `synchronous = NORMAL` may lose the last transaction on power
/// loss but never corrupts the file. `cache_size` is negative, so KiB.
const PRAGMAS: &[(&str, PragmaValue)] = &[
    ("journal_mode", PragmaValue::Text("WAL")),
    ("synchronous", PragmaValue::Text("NORMAL")),
    ("mmap_size", PragmaValue::Int(256 * 1024 * 1024)),
    ("cache_size", PragmaValue::Int(-64_000)),
    ("temp_store", PragmaValue::Text("MEMORY")),
    ("foreign_keys", PragmaValue::Text("ON")),
    ("busy_timeout", PragmaValue::Int(5_000)),
];

#[derive(Debug, Clone, Copy)]
enum PragmaValue {
    Text(&'static str),
    Int(i64),
}

/// Shared handle to a SQLite database. Cloning shares the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database file at `path`.
    ///
    /// Blocks on file I/O. Async callers should prefer
    /// [`open_and_migrate`](Self::open_and_migrate).
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");
        Self::from_connection(Connection::open(path)?)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Opens `config.database_path` and brings it up to date.
    pub async fn open_with_config(
        config: &StoreConfig,
        migrations: &'static [Migration],
    ) -> StoreResult<Self> {
        Self::open_and_migrate(config.database_path.clone(), migrations).await
    }

    /// Opens the file on the blocking pool, then applies pending migrations.
    pub async fn open_and_migrate(
        path: impl Into<PathBuf>,
        migrations: &'static [Migration],
    ) -> StoreResult<Self> {
        let path = path.into();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.migrate(migrations).await?;
        Ok(db)
    }

    /// Applies the migrations newer than the recorded schema version.
    pub async fn migrate(&self, migrations: &'static [Migration]) -> StoreResult<()> {
        self.execute(move |conn| migration::run_all(conn, migrations))
            .await
    }

    /// Runs `f` against the connection on the blocking pool.
    ///
    /// ```ignore
    /// let tables: i64 = db
    ///     .execute(|conn| {
    ///         Ok(conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get(0))?)
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            f(&guard)
        })
        .await?
    }

    /// Like [`execute`](Self::execute) with mutable access, for
    /// transactions.
    pub async fn execute_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await?
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        for (name, value) in PRAGMAS {
            match value {
                PragmaValue::Text(v) => conn.pragma_update(None, name, v)?,
                PragmaValue::Int(v) => conn.pragma_update(None, name, v)?,
            }
        }
        debug!(pragmas = PRAGMAS.len(), "connection configured");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::TaskJoin(format!("connection mutex poisoned: {e}")))
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    static SCHEMA: &[Migration] = &[Migration {
        version: 1,
        description: "tags",
        sql: "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
    }];

    async fn pragma<T>(db: &Database, name: &'static str) -> T
    where
        T: rusqlite::types::FromSql + Send + 'static,
    {
        db.execute(move |conn| Ok(conn.pragma_query_value(None, name, |row| row.get(0))?))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn on_disk_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("wal.db")).unwrap();
        let journal: String = pragma(&db, "journal_mode").await;
        assert_eq!(journal.to_lowercase(), "wal");
        let fk: i64 = pragma(&db, "foreign_keys").await;
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn in_memory_database_is_usable() {
        let db = Database::open_in_memory().unwrap();
        let busy: i64 = pragma(&db, "busy_timeout").await;
        assert_eq!(busy, 5_000);
    }

    #[tokio::test]
    async fn migrate_creates_schema() {
        let db = Database::open_in_memory().unwrap();
        db.migrate(SCHEMA).await.unwrap();

        let count: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT count(*) FROM tags", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn execute_mut_commits_transactions() {
        let db = Database::open_in_memory().unwrap();
        db.migrate(SCHEMA).await.unwrap();

        let inserted = db
            .execute_mut(|conn| {
                let tx = conn.transaction()?;
                let n = tx.execute("INSERT INTO tags (name) VALUES ('a'), ('b')", [])?;
                tx.commit()?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let count: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT count(*) FROM tags", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn open_with_config_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new().with_database_path(dir.path().join("quarry.db"));
        let db = Database::open_with_config(&config, SCHEMA).await.unwrap();

        db.execute_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("INSERT INTO tags (name) VALUES ('faq')", [])?;
            tx.commit()?;
            Ok(())
        })
        .await
        .unwrap();

        assert!(config.database_path.exists());

        // Reopening sees the committed row and skips the applied migration.
        drop(db);
        let reopened = Database::open_with_config(&config, SCHEMA).await.unwrap();
        let names: Vec<String> = reopened
            .execute(|conn| {
                let mut stmt = conn.prepare("SELECT name FROM tags")?;
                let names = stmt
                    .query_map([], |r| r.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .unwrap();
        assert_eq!(names, vec!["faq"]);
    }
}
