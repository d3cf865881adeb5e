//! SQLite pool setup and startup schema upgrade.

use crate::migrations::{run_migrations, MigrationError};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// Pool shared by the message store and the HTTP handlers.
pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("database pool unavailable: {0}")]
    PoolInit(#[from] r2d2::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Builds the pool. Each connection is switched to WAL, enforces foreign
/// keys and honours `settings.busy_timeout_ms`.
///
/// `:memory:` gives every pooled connection its own empty database; use a
/// temporary file when connections must see the same rows.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| {
            // `:memory:` cannot use WAL and answers "memory".
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!("journal_mode stayed {journal_mode}, expected wal")),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                settings.busy_timeout_ms
            ))
        });

    Ok(Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?)
}

/// Opens the pool and applies pending migrations on one of its connections.
///
/// Returns the pool together with the number of migrations applied.
pub fn open_database(
    db_path: &str,
    settings: DbRuntimeSettings,
) -> Result<(DbPool, usize), PoolError> {
    let pool = create_pool(db_path, settings)?;
    let applied = {
        let conn = pool.get()?;
        run_migrations(&conn)?
    };
    if applied > 0 {
        tracing::info!(count = applied, path = db_path, "applied database migrations");
    }
    Ok((pool, applied))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connections_carry_configured_pragmas() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
        };

        let pool = create_pool(":memory:", settings).expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .expect("should query foreign_keys");
        assert_eq!(fk, 1, "foreign keys should be enabled");

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 2_500, "busy timeout should match settings");

        assert_eq!(pool.max_size(), 3, "pool max size should match settings");
    }

    #[test]
    fn open_database_shares_schema_across_file_connections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("souk.db");
        let path = path.to_str().expect("utf-8 path");

        let (pool, applied) =
            open_database(path, DbRuntimeSettings::default()).expect("open should succeed");
        assert_eq!(applied, 3);

        // Hold one connection so the pool hands out a second, distinct one.
        let _first = pool.get().expect("first connection");
        let second = pool.get().expect("second connection");
        let mode: String = second
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert_eq!(mode, "wal");
        let users: i64 = second
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .expect("users table should be visible to every pooled connection");
        assert_eq!(users, 0);

        let (_pool, reapplied) =
            open_database(path, DbRuntimeSettings::default()).expect("reopen should succeed");
        assert_eq!(reapplied, 0);
    }
}
