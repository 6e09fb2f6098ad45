//! Tally Core - schema migrations for a personal finance database
//!
//! This crate implements the migration engine following hexagonal architecture:
//!
//! - **domain**: Migration definitions, ledger entries, results and errors
//! - **ports**: Trait definitions for the database connection and migration sources
//! - **services**: Ledger, executor, runner, rollback, reset and the facade over them
//! - **adapters**: Concrete implementations (DuckDB, migration directories, embedded scripts)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod script;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbStore;
use config::Config;
use ports::MigrationSource;
use services::{DoctorService, MigrationLedger, MigrationService};

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result as CoreResult};
pub use domain::{LedgerEntry, MigrationDefinition, MigrationResult, MigrationStatus, ResetResult};
pub use ports::{DbError, SqlConnection};

/// Main context for Tally operations
///
/// Holds the configuration, the database store and the configured migration
/// source. Opening a context does not migrate; callers decide when to.
pub struct TallyContext {
    pub config: Config,
    pub store: Arc<DuckDbStore>,
    pub source: Arc<dyn MigrationSource + Send + Sync>,
    pub ledger: MigrationLedger,
    pub doctor_service: DoctorService,
}

impl TallyContext {
    pub fn new(tally_dir: &Path) -> Result<Self> {
        let config = Config::load(tally_dir)?;
        let ledger = config.ledger()?;

        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let store = Arc::new(DuckDbStore::open(&config.db_path)?);
        let source = config.source();

        let doctor_service =
            DoctorService::new(Arc::clone(&store), Arc::clone(&source), ledger.clone())
                .allow_out_of_order(config.allow_out_of_order);

        Ok(Self {
            config,
            store,
            source,
            ledger,
            doctor_service,
        })
    }

    /// Run `f` with a migration service over the store's connection,
    /// configured from settings
    pub fn migrations<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(MigrationService<'_>) -> CoreResult<T>,
    {
        self.store.with_connection(|conn| {
            let service = MigrationService::new(conn, self.source.as_ref())
                .with_ledger(self.ledger.clone())
                .with_options(self.config.run_options());
            f(service)
        })
    }
}
