//! Core domain entities
//!
//! Pure data structures describing migrations and their ledger - no I/O.

mod migration;
pub mod result;

pub use migration::{
    LedgerEntry, MigrationDefinition, MigrationResult, MigrationStatus, ResetResult,
};
