//! Migration ledger - which migrations are applied, and when
//!
//! Backed by a table with one row per applied migration. The `UNIQUE`
//! constraint on `migration_name` is the only guard against two runs
//! applying the same migration concurrently.

use std::sync::OnceLock;

use chrono::{NaiveDateTime, Utc};
use regex::Regex;

use crate::domain::result::{Error, Result};
use crate::domain::LedgerEntry;
use crate::ports::{DbError, SqlConnection};

/// Default ledger table name
pub const DEFAULT_LEDGER_TABLE: &str = "sys_migrations";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

fn identifier() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

fn parse_applied_at(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Persisted record of applied migrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationLedger {
    table: String,
}

impl Default for MigrationLedger {
    fn default() -> Self {
        Self {
            table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

impl MigrationLedger {
    /// Ledger stored in `table`, which must be a plain SQL identifier
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !identifier().is_match(&table) {
            return Err(Error::config(format!(
                "ledger table name '{}' is not a plain identifier",
                table
            )));
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the ledger table if absent. Safe to call on every run.
    pub fn ensure_ready(&self, conn: &dyn SqlConnection) -> Result<()> {
        conn.execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGINT PRIMARY KEY,
                migration_name VARCHAR NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL,
                checksum VARCHAR
            )",
            self.table
        ))?;
        Ok(())
    }

    /// Whether the ledger table exists yet
    pub fn is_ready(&self, conn: &dyn SqlConnection) -> Result<bool> {
        Ok(conn.table_exists(&self.table)?)
    }

    /// All entries, oldest first
    pub fn applied_entries(&self, conn: &dyn SqlConnection) -> Result<Vec<LedgerEntry>> {
        let rows = conn.query(
            &format!(
                "SELECT migration_name, CAST(applied_at AS VARCHAR), checksum
                 FROM {} ORDER BY applied_at, id",
                self.table
            ),
            &[],
            3,
        )?;

        rows.into_iter()
            .map(|row| {
                let mut cols = row.into_iter();
                let name = cols.next().flatten().unwrap_or_default();
                let applied_at = cols.next().flatten().unwrap_or_default();
                let checksum = cols.next().flatten();
                let applied_at = parse_applied_at(&applied_at).ok_or_else(|| {
                    Error::Database(DbError::Execution(format!(
                        "unreadable applied_at '{}' for migration {}",
                        applied_at, name
                    )))
                })?;
                Ok(LedgerEntry {
                    name,
                    applied_at,
                    checksum,
                })
            })
            .collect()
    }

    /// Names of all entries, in applied order
    pub fn applied_names(&self, conn: &dyn SqlConnection) -> Result<Vec<String>> {
        Ok(self
            .applied_entries(conn)?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    pub fn contains(&self, conn: &dyn SqlConnection, name: &str) -> Result<bool> {
        let rows = conn.query(
            &format!(
                "SELECT migration_name FROM {} WHERE migration_name = ?",
                self.table
            ),
            &[name],
            1,
        )?;
        Ok(!rows.is_empty())
    }

    /// Insert an entry inside the caller's transaction
    ///
    /// An existing entry is a hard `DuplicateMigration`: it means either a
    /// concurrent run got there first or the ledger is corrupt.
    pub fn record(&self, conn: &dyn SqlConnection, name: &str, checksum: Option<&str>) -> Result<()> {
        if self.contains(conn, name)? {
            return Err(Error::DuplicateMigration(name.to_string()));
        }

        let applied_at = Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string();
        let insert = format!(
            "INSERT INTO {t} (id, migration_name, applied_at, checksum)
             SELECT COALESCE(MAX(id), 0) + 1, ?, CAST(? AS TIMESTAMP), NULLIF(?, '')
             FROM {t}",
            t = self.table
        );

        conn.execute_params(&insert, &[name, &applied_at, checksum.unwrap_or("")])
            .map_err(|e| {
                if e.is_constraint_violation() {
                    Error::DuplicateMigration(name.to_string())
                } else {
                    Error::Database(e)
                }
            })?;
        Ok(())
    }

    /// Delete the entry for `name` inside the caller's transaction. Returns
    /// whether an entry existed; absence is not an error.
    pub fn remove(&self, conn: &dyn SqlConnection, name: &str) -> Result<bool> {
        let deleted = conn.execute_params(
            &format!("DELETE FROM {} WHERE migration_name = ?", self.table),
            &[name],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckdb::Connection;

    fn ready() -> (Connection, MigrationLedger) {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = MigrationLedger::default();
        ledger.ensure_ready(&conn).unwrap();
        (conn, ledger)
    }

    #[test]
    fn test_rejects_non_identifier_table() {
        assert!(MigrationLedger::new("sys_migrations").is_ok());
        assert!(matches!(
            MigrationLedger::new("migrations; DROP TABLE accounts"),
            Err(Error::Config(_))
        ));
        assert!(MigrationLedger::new("1abc").is_err());
    }

    #[test]
    fn test_ensure_ready_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = MigrationLedger::default();
        assert!(!ledger.is_ready(&conn).unwrap());

        ledger.ensure_ready(&conn).unwrap();
        ledger.ensure_ready(&conn).unwrap();

        assert!(ledger.is_ready(&conn).unwrap());
        assert!(ledger.applied_names(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_record_preserves_applied_order() {
        let (conn, ledger) = ready();
        ledger.record(&conn, "002_add_users", Some("abc")).unwrap();
        ledger.record(&conn, "001_init", None).unwrap();

        let entries = ledger.applied_entries(&conn).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["002_add_users", "001_init"]);
        assert_eq!(entries[0].checksum.as_deref(), Some("abc"));
        assert_eq!(entries[1].checksum, None);
    }

    #[test]
    fn test_record_duplicate_is_hard_error() {
        let (conn, ledger) = ready();
        ledger.record(&conn, "001_init", None).unwrap();

        let err = ledger.record(&conn, "001_init", None).unwrap_err();

        assert!(matches!(err, Error::DuplicateMigration(name) if name == "001_init"));
        assert_eq!(ledger.applied_names(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_is_safe_when_absent() {
        let (conn, ledger) = ready();
        ledger.record(&conn, "001_init", None).unwrap();

        assert!(ledger.remove(&conn, "001_init").unwrap());
        assert!(!ledger.remove(&conn, "001_init").unwrap());
        assert!(!ledger.contains(&conn, "001_init").unwrap());
    }

    #[test]
    fn test_custom_table_name() {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = MigrationLedger::new("log_migrations").unwrap();
        ledger.ensure_ready(&conn).unwrap();
        ledger.record(&conn, "001_initial_schema", None).unwrap();

        assert!(conn.table_exists("log_migrations").unwrap());
        assert!(!conn.table_exists(DEFAULT_LEDGER_TABLE).unwrap());
    }

    #[test]
    fn test_parse_applied_at() {
        assert!(parse_applied_at("2026-10-16 08:30:00.123456").is_some());
        assert!(parse_applied_at("2026-10-16 08:30:00").is_some());
        assert!(parse_applied_at("yesterday").is_none());
    }
}
