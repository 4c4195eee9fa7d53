//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time. They run
//! sequentially on startup, tracked by the `_estuary_migrations` table.
//! Each migration runs exactly once — if it has already been applied, it
//! is skipped.

use rusqlite::Connection;
use thiserror::Error;

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[Migration {
    name: "000_entries",
    sql: include_str!("migrations/000_entries.sql"),
}];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// The migration tracking table could not be created or read.
    #[error("migration bookkeeping failed: {0}")]
    Bookkeeping(#[from] rusqlite::Error),
}

/// Runs all pending migrations on the given connection.
pub fn run_migrations(conn: &Connection) -> Result<(), MigrationError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _estuary_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    for migration in MIGRATIONS {
        let applied: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM _estuary_migrations WHERE name = ?1)",
            [migration.name],
            |row| row.get(0),
        )?;
        if applied {
            continue;
        }

        tracing::debug!(name = migration.name, "applying migration");
        conn.execute_batch(migration.sql)
            .map_err(|source| MigrationError::ExecutionFailed {
                name: migration.name.to_string(),
                source,
            })?;
        conn.execute(
            "INSERT INTO _estuary_migrations (name) VALUES (?1)",
            [migration.name],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("first run should succeed");
        run_migrations(&conn).expect("second run should be a no-op");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM _estuary_migrations", [], |row| {
                row.get(0)
            })
            .expect("should count migrations");
        assert_eq!(count as usize, MIGRATIONS.len());
    }
}
