//! SQLite storage for users and direct messages.
//!
//! [`open_database`] is the single entry point at startup: it builds the
//! `r2d2` pool and upgrades the schema before any handler runs. Readers and
//! the relay's single insert per send share that pool; WAL keeps history
//! reads from blocking on writes.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, open_database, DbPool, DbRuntimeSettings, PoolError};
