//! Log database migrations - embedded SQL files
//!
//! Applied to logs.duckdb by the same engine that migrates the finance
//! database, with its own ledger inside logs.duckdb.

use crate::adapters::{EmbeddedMigration, EmbeddedSource};

/// All log migrations, embedded at compile time.
///
/// IMPORTANT: When adding a new migration:
/// 1. Create the SQL file: NNN_description.sql (and down/NNN_description.sql)
/// 2. Add an entry here
pub const LOG_MIGRATIONS: &[EmbeddedMigration] = &[EmbeddedMigration {
    name: "001_initial_schema.sql",
    up: include_str!("001_initial_schema.sql"),
    down: Some(include_str!("down/001_initial_schema.sql")),
}];

pub fn log_source() -> EmbeddedSource {
    EmbeddedSource::new(LOG_MIGRATIONS).labeled("embedded log migrations")
}
