//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces the migration engine depends on. The engine
//! only sees these traits, never a concrete driver or storage.

mod connection;
mod source;

pub use connection::{
    quote_ident, DbError, DbResult, ForeignKey, ObjectKind, Row, SchemaObject, SqlConnection,
    DEFAULT_SCHEMA,
};
pub use source::{has_numeric_prefix, sort_and_check, MigrationSource};
