//! SQLite-backed store driver for the Estuary messaging SDK.
//!
//! Provides a persistent [`estuary_store::StoreDriver`] on a single
//! SQLite database: connection pooling (via `r2d2`), WAL-mode
//! initialization, and embedded SQL migrations. Change notifications for
//! `watch_list`/`watch_value` are local to the driver — this backend is
//! meant for single-process deployments and tests that need durability;
//! realtime multi-client backends plug in behind the same trait.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: no external database process required.
//!   WAL allows concurrent readers with a single writer, which matches
//!   the driver's access pattern.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL files are compiled in via
//!   `include_str!`, so the schema ships with the code that depends on
//!   it and cannot drift.

mod driver;
mod migrations;
mod pool;

pub use driver::SqliteDriver;
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings};

/// Errors raised while opening or migrating the database.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),

    /// A migration failed to apply.
    #[error(transparent)]
    Migration(#[from] migrations::MigrationError),

    /// A SQL operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}
