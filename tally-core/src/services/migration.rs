//! Migration service - manages database schema migrations
//!
//! Facade over the engine pieces. Each applied migration is tracked in the
//! ledger table (`sys_migrations` unless configured otherwise) so running
//! again is a no-op.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::adapters::duckdb::DuckDbStore;
use crate::domain::result::{Error, Result};
use crate::domain::{MigrationResult, MigrationStatus, ResetResult};
use crate::ports::{MigrationSource, SqlConnection};
use crate::services::ledger::MigrationLedger;
use crate::services::reset::SchemaResetter;
use crate::services::rollback::RollbackCoordinator;
use crate::services::runner::{MigrationObserver, MigrationRunner, RunOptions};

/// Service for managing database migrations
pub struct MigrationService<'a> {
    conn: &'a dyn SqlConnection,
    source: &'a dyn MigrationSource,
    ledger: MigrationLedger,
    options: RunOptions,
    observer: Option<&'a dyn MigrationObserver>,
}

impl<'a> MigrationService<'a> {
    pub fn new(conn: &'a dyn SqlConnection, source: &'a dyn MigrationSource) -> Self {
        Self {
            conn,
            source,
            ledger: MigrationLedger::default(),
            options: RunOptions::default(),
            observer: None,
        }
    }

    pub fn with_ledger(mut self, ledger: MigrationLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Use a ledger table other than `sys_migrations`
    pub fn with_ledger_table(self, table: &str) -> Result<Self> {
        let ledger = MigrationLedger::new(table)?;
        Ok(self.with_ledger(ledger))
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn MigrationObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    fn runner(&self) -> MigrationRunner<'_> {
        let runner = MigrationRunner::new(self.conn, self.source, &self.ledger)
            .with_options(self.options.clone());
        match self.observer {
            Some(observer) => runner.with_observer(observer),
            None => runner,
        }
    }

    /// Apply all pending migrations, returning how many were applied
    pub fn run(&self) -> Result<usize> {
        self.runner().run()
    }

    /// Run all pending migrations
    ///
    /// This is the main entry point. It:
    /// 1. Ensures the ledger table exists
    /// 2. Reads the already applied migrations
    /// 3. Applies pending migrations in name order, each in its own transaction
    /// 4. Stops at the first failure
    pub fn run_pending(&self) -> Result<MigrationResult> {
        self.runner().run_report()
    }

    /// Names the next run would apply, without applying them
    pub fn plan(&self) -> Result<Vec<String>> {
        self.runner().plan()
    }

    pub fn status(&self) -> Result<MigrationStatus> {
        self.runner().status()
    }

    /// Get list of already applied migration names, in applied order
    pub fn get_applied(&self) -> Result<Vec<String>> {
        if !self.ledger.is_ready(self.conn)? {
            return Ok(Vec::new());
        }
        self.ledger.applied_names(self.conn)
    }

    /// Get list of pending migration names
    pub fn get_pending(&self) -> Result<Vec<String>> {
        Ok(self.status()?.pending)
    }

    /// Revert one migration with its down script
    pub fn rollback(&self, name: &str) -> Result<()> {
        RollbackCoordinator::new(self.conn, self.source, &self.ledger).rollback(name)
    }

    /// Revert the most recently applied migration
    pub fn rollback_last(&self) -> Result<Option<String>> {
        RollbackCoordinator::new(self.conn, self.source, &self.ledger).rollback_last()
    }

    /// Drop every schema object and re-run all migrations
    pub fn reset(&self) -> Result<ResetResult> {
        SchemaResetter::new(self.conn, self.source, &self.ledger)
            .with_options(self.options.clone())
            .reset()
    }
}

/// Run pending migrations on a blocking worker thread
///
/// For async callers; the store's connection is held for the whole run.
pub fn spawn_pending(
    store: Arc<DuckDbStore>,
    source: Arc<dyn MigrationSource + Send + Sync>,
    options: RunOptions,
) -> JoinHandle<Result<MigrationResult>> {
    tokio::task::spawn_blocking(move || {
        store.with_connection(|conn| {
            MigrationService::new(conn, source.as_ref())
                .with_options(options)
                .run_pending()
        })
    })
}

/// Await a [`spawn_pending`] handle, folding a panicked worker into `Error`
pub async fn join_pending(handle: JoinHandle<Result<MigrationResult>>) -> Result<MigrationResult> {
    handle
        .await
        .map_err(|e| Error::Other(format!("migration worker failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::EmbeddedSource;
    use duckdb::Connection;

    fn source() -> EmbeddedSource {
        EmbeddedSource::empty()
            .with_reversible(
                "001_init",
                "CREATE TABLE accounts (id INTEGER);",
                "DROP TABLE accounts;",
            )
            .with_reversible(
                "002_categories",
                "CREATE TABLE categories (id INTEGER);",
                "DROP TABLE categories;",
            )
    }

    #[test]
    fn test_run_pending_reports_counts() {
        let conn = Connection::open_in_memory().unwrap();
        let source = source();
        let service = MigrationService::new(&conn, &source);

        let first = service.run_pending().unwrap();
        assert_eq!(first.applied, vec!["001_init", "002_categories"]);
        assert_eq!(first.already_applied, 0);

        let second = service.run_pending().unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.already_applied, 2);
    }

    #[test]
    fn test_get_applied_and_pending() {
        let conn = Connection::open_in_memory().unwrap();
        let source = source();
        let service = MigrationService::new(&conn, &source);

        assert!(service.get_applied().unwrap().is_empty());
        assert_eq!(service.get_pending().unwrap().len(), 2);

        service.run().unwrap();
        assert_eq!(service.get_applied().unwrap().len(), 2);
        assert!(service.get_pending().unwrap().is_empty());
    }

    #[test]
    fn test_rollback_last_then_rerun() {
        let conn = Connection::open_in_memory().unwrap();
        let source = source();
        let service = MigrationService::new(&conn, &source);
        service.run().unwrap();

        let rolled = service.rollback_last().unwrap();
        assert_eq!(rolled.as_deref(), Some("002_categories"));
        assert_eq!(service.get_pending().unwrap(), vec!["002_categories"]);

        assert_eq!(service.run().unwrap(), 1);
    }

    #[test]
    fn test_custom_ledger_table() {
        let conn = Connection::open_in_memory().unwrap();
        let source = source();
        let service = MigrationService::new(&conn, &source)
            .with_ledger_table("schema_history")
            .unwrap();

        service.run().unwrap();

        assert!(conn.table_exists("schema_history").unwrap());
        assert!(service.with_ledger_table("bad name").is_err());
    }

    #[tokio::test]
    async fn test_spawn_pending() {
        let store = Arc::new(DuckDbStore::open_in_memory().unwrap());
        let source: Arc<dyn MigrationSource + Send + Sync> = Arc::new(source());

        let result = join_pending(spawn_pending(
            store.clone(),
            source.clone(),
            RunOptions::default(),
        ))
        .await
        .unwrap();
        assert_eq!(result.applied.len(), 2);

        let again = join_pending(spawn_pending(store, source, RunOptions::default()))
            .await
            .unwrap();
        assert!(again.applied.is_empty());
    }
}
