//! Versioned schema migrations.
//!
//! Applications own their schema and pass an ordered list of [`Migration`]s.
//! Applied versions are recorded in [`MIGRATIONS_TABLE`], so running the same
//! list again is a no-op.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    pub version: u32,
    /// Human-readable description.
    pub description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    pub sql: &'static str,
}

// ── public API ───────────────────────────────────────────────────────

/// Bookkeeping table holding one row per applied migration.
pub const MIGRATIONS_TABLE: &str = "_quarry_migrations";

/// Applies every migration newer than the recorded version, each in its own
/// transaction. Synchronous; async callers go through
/// [`Database::migrate`](crate::Database::migrate).
pub fn run_all(conn: &Connection, migrations: &[Migration]) -> StoreResult<()> {
    check_order(migrations)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );"
    ))
    .map_err(failed(0, "create bookkeeping table"))?;

    let current = current_version(conn)?;
    let mut applied = 0usize;
    for migration in migrations.iter().filter(|m| m.version > current) {
        apply(conn, migration)?;
        applied += 1;
    }

    if applied == 0 {
        debug!(version = current, "schema up to date");
    } else {
        info!(from = current, applied, to = current_version(conn)?, "schema migrated");
    }
    Ok(())
}

/// Latest applied version, `0` on a fresh database.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
    .map_err(failed(0, "read current version"))
}

// ── internals ────────────────────────────────────────────────────────

fn check_order(migrations: &[Migration]) -> StoreResult<()> {
    match migrations.windows(2).find(|w| w[1].version <= w[0].version) {
        Some(w) => Err(StoreError::Migration {
            version: w[1].version,
            message: format!(
                "versions must be strictly increasing ({} follows {})",
                w[1].version, w[0].version
            ),
        }),
        None => Ok(()),
    }
}

fn failed(version: u32, step: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |err| StoreError::Migration {
        version,
        message: format!("{step}: {err}"),
    }
}

/// Runs one migration and records it. `conn.transaction()` needs
/// `&mut Connection`, so the transaction is managed by hand.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    let version = migration.version;
    debug!(version, description = migration.description, "applying migration");

    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(failed(version, "begin"))?;

    let outcome = conn
        .execute_batch(migration.sql)
        .map_err(failed(version, "execute"))
        .and_then(|()| {
            conn.execute(
                &format!(
                    "INSERT INTO {MIGRATIONS_TABLE} (version, description, applied_at) \
                     VALUES (?1, ?2, ?3)"
                ),
                rusqlite::params![version, migration.description, chrono::Utc::now().timestamp()],
            )
            .map_err(failed(version, "record"))
        });

    match outcome {
        Ok(_) => conn
            .execute_batch("COMMIT;")
            .map_err(failed(version, "commit")),
        Err(err) => {
            warn!(version, %err, "migration failed, rolling back");
            if let Err(rollback) = conn.execute_batch("ROLLBACK;") {
                warn!(version, %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
