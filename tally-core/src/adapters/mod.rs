//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the SqlConnection port (plus a store owning the connection)
//! - Local filesystem for MigrationSource
//! - Compiled-in scripts for MigrationSource

pub mod directory;
pub mod duckdb;
pub mod embedded;

pub use directory::{CreatedMigration, DirectorySource};
pub use embedded::{EmbeddedMigration, EmbeddedSource};
