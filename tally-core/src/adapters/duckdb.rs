//! DuckDB adapter - `SqlConnection` for `duckdb::Connection` and a store
//! that owns a connection for the application

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use duckdb::{params_from_iter, Connection};

use crate::domain::result::{Error, Result};
use crate::domain::MigrationResult;
use crate::ports::{
    DbError, DbResult, ForeignKey, MigrationSource, ObjectKind, Row, SchemaObject, SqlConnection,
};
use crate::services::MigrationService;

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Classify a DuckDB error message
fn classify(message: String) -> DbError {
    let lower = message.to_lowercase();
    if lower.contains("constraint error")
        || lower.contains("duplicate key")
        || lower.contains("constraint violat")
    {
        DbError::Constraint(message)
    } else {
        DbError::Execution(message)
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        classify(err.to_string())
    }
}

const SCHEMA_OBJECTS_SQL: &str = "
    SELECT 'view', schema_name, view_name FROM duckdb_views()
     WHERE NOT internal AND NOT temporary AND database_name = current_database()
    UNION ALL
    SELECT 'table', schema_name, table_name FROM duckdb_tables()
     WHERE NOT internal AND NOT temporary AND database_name = current_database()
    UNION ALL
    SELECT DISTINCT function_type, schema_name, function_name FROM duckdb_functions()
     WHERE function_type IN ('macro', 'table_macro') AND NOT internal
       AND database_name = current_database()
    UNION ALL
    SELECT 'type', schema_name, type_name FROM duckdb_types()
     WHERE NOT internal AND database_name = current_database()
    UNION ALL
    SELECT 'sequence', schema_name, sequence_name FROM duckdb_sequences()
     WHERE NOT temporary AND database_name = current_database()
    UNION ALL
    SELECT 'schema', schema_name, schema_name FROM duckdb_schemas()
     WHERE NOT internal AND database_name = current_database() AND schema_name <> 'main'";

const FOREIGN_KEYS_SQL: &str = "
    SELECT schema_name, table_name, referenced_table FROM duckdb_constraints()
     WHERE constraint_type = 'FOREIGN KEY' AND database_name = current_database()";

impl SqlConnection for Connection {
    fn execute(&self, statement: &str) -> DbResult<()> {
        self.execute_batch(statement)?;
        Ok(())
    }

    fn execute_params(&self, statement: &str, params: &[&str]) -> DbResult<usize> {
        let rows = Connection::execute(self, statement, params_from_iter(params.iter()))?;
        Ok(rows)
    }

    fn query(&self, sql: &str, params: &[&str], width: usize) -> DbResult<Vec<Row>> {
        let mut stmt = self.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            (0..width)
                .map(|i| row.get::<_, Option<String>>(i))
                .collect::<duckdb::Result<Row>>()
        })?;

        let rows = rows.collect::<duckdb::Result<Vec<Row>>>()?;
        Ok(rows)
    }

    fn schema_objects(&self) -> DbResult<Vec<SchemaObject>> {
        let rows = SqlConnection::query(self, SCHEMA_OBJECTS_SQL, &[], 3)?;

        let mut objects = Vec::with_capacity(rows.len());
        for row in rows {
            let (kind, schema, name) = match row.as_slice() {
                [Some(kind), Some(schema), Some(name)] => (kind, schema, name),
                _ => continue,
            };
            let kind = match kind.as_str() {
                "view" => ObjectKind::View,
                "table" => ObjectKind::Table,
                "macro" => ObjectKind::Macro,
                "table_macro" => ObjectKind::TableMacro,
                "type" => ObjectKind::Type,
                "sequence" => ObjectKind::Sequence,
                "schema" => ObjectKind::Schema,
                other => {
                    tracing::debug!(kind = other, "skipping unknown catalog object");
                    continue;
                }
            };
            objects.push(SchemaObject::new(kind, schema.as_str(), name.as_str()));
        }
        objects.sort();
        Ok(objects)
    }

    fn foreign_keys(&self) -> DbResult<Vec<ForeignKey>> {
        let rows = SqlConnection::query(self, FOREIGN_KEYS_SQL, &[], 3)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match row.as_slice() {
                [Some(schema), Some(child), Some(parent)] => Some(ForeignKey {
                    child: SchemaObject::table(schema.as_str(), child.as_str()),
                    parent: SchemaObject::table(schema.as_str(), parent.as_str()),
                }),
                _ => None,
            })
            .collect())
    }
}

/// DuckDB-backed store owning the application's connection
///
/// The migration engine never opens connections itself; the store lends
/// its connection for the duration of one engine call.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbStore {
    /// Open (or create) a database file
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which can occur when another process (e.g. the desktop app) holds the
    /// database while the CLI starts.
    pub fn open(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            delay_ms = delay.as_millis() as u64,
                            "database busy, retrying: {}",
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(err_msg);
                        continue;
                    }
                    return Err(Error::Database(DbError::Connection(format!(
                        "{}: {}",
                        db_path.display(),
                        err_msg
                    ))));
                }
            }
        }

        Err(Error::Database(DbError::Connection(last_error.unwrap_or_else(|| {
            format!("Failed to open database after {} retries", MAX_RETRIES)
        }))))
    }

    /// In-memory database, for tests and throwaway runs
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default()
            .enable_autoload_extension(false)
            .map_err(DbError::from)?;
        let conn = Connection::open_in_memory_with_flags(config).map_err(DbError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    /// Attempt to open a database connection (called by open() with retry logic)
    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Disable extension autoloading to avoid macOS code signing issues
        // (cached extensions in ~/.duckdb/extensions may have different Team IDs)
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::Other(format!("Lock poisoned: {}", e)))
    }

    /// Run `f` with exclusive use of the connection
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run all pending migrations from `source` against this store
    pub fn run_migrations(&self, source: &dyn MigrationSource) -> Result<MigrationResult> {
        self.with_connection(|conn| MigrationService::new(conn, source).run_pending())
    }

    /// Path of the database file, `None` when in memory
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn get_db_size(&self) -> Result<u64> {
        match &self.db_path {
            Some(path) => Ok(std::fs::metadata(path)?.len()),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_classify_constraint_errors() {
        assert!(classify(
            "Constraint Error: Duplicate key \"migration_name: 001_init\" violates unique constraint"
                .to_string()
        )
        .is_constraint_violation());
        assert!(!classify("Parser Error: syntax error at or near \"TABLEX\"".to_string())
            .is_constraint_violation());
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error("IO Error: Could not set lock on file: Resource temporarily unavailable"));
        assert!(is_retryable_error("The process cannot access the file because it is being used by another process"));
        assert!(!is_retryable_error("Catalog Error: Table with name x does not exist"));
    }

    #[test]
    fn test_execute_and_query() {
        let conn = memory();
        SqlConnection::execute(&conn, "CREATE TABLE categories (name VARCHAR, budget INTEGER)")
            .unwrap();
        let inserted = conn
            .execute_params(
                "INSERT INTO categories VALUES (?, CAST(? AS INTEGER))",
                &["groceries", "400"],
            )
            .unwrap();
        assert_eq!(inserted, 1);

        let rows = SqlConnection::query(
            &conn,
            "SELECT name, CAST(budget AS VARCHAR), NULL FROM categories WHERE name = ?",
            &["groceries"],
            3,
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![vec![Some("groceries".to_string()), Some("400".to_string()), None]]
        );
    }

    #[test]
    fn test_failed_statement_reports_execution_error() {
        let conn = memory();
        let err = SqlConnection::execute(&conn, "CREATE TABLEX nope (id INT)").unwrap_err();
        assert!(matches!(err, DbError::Execution(_)));
    }

    #[test]
    fn test_duplicate_key_is_constraint_violation() {
        let conn = memory();
        SqlConnection::execute(&conn, "CREATE TABLE t (name VARCHAR UNIQUE)").unwrap();
        conn.execute_params("INSERT INTO t VALUES (?)", &["a"]).unwrap();
        let err = conn.execute_params("INSERT INTO t VALUES (?)", &["a"]).unwrap_err();
        assert!(err.is_constraint_violation(), "got {:?}", err);
    }

    #[test]
    fn test_schema_objects_lists_user_objects() {
        let conn = memory();
        conn.execute_batch(
            "CREATE TABLE accounts (id VARCHAR);
             CREATE VIEW account_names AS SELECT id FROM accounts;
             CREATE SEQUENCE upload_seq;
             CREATE SCHEMA budget;
             CREATE TABLE budget.envelopes (id VARCHAR);
             CREATE TEMP TABLE scratch (id INT);",
        )
        .unwrap();

        let objects = conn.schema_objects().unwrap();
        assert!(objects.contains(&SchemaObject::table("main", "accounts")));
        assert!(objects.contains(&SchemaObject::table("budget", "envelopes")));
        assert!(objects.contains(&SchemaObject::new(ObjectKind::View, "main", "account_names")));
        assert!(objects.contains(&SchemaObject::new(ObjectKind::Sequence, "main", "upload_seq")));
        assert!(objects.contains(&SchemaObject::new(ObjectKind::Schema, "budget", "budget")));
        assert!(!objects.iter().any(|o| o.name == "scratch"));
        assert!(!objects.iter().any(|o| o.kind == ObjectKind::Schema && o.name == "main"));
    }

    #[test]
    fn test_table_exists() {
        let conn = memory();
        assert!(!conn.table_exists("sys_migrations").unwrap());
        SqlConnection::execute(&conn, "CREATE TABLE sys_migrations (id BIGINT)").unwrap();
        assert!(conn.table_exists("sys_migrations").unwrap());
    }

    #[test]
    fn test_store_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.duckdb");
        let store = DuckDbStore::open(&path).unwrap();
        store
            .with_connection(|conn| {
                SqlConnection::execute(conn, "CREATE TABLE t (id INT)")?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.db_path(), Some(path.as_path()));
        assert!(path.exists());
    }
}
