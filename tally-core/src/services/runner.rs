//! Applying pending migrations in order

use std::collections::HashSet;

use crate::domain::result::{Error, Result};
use crate::domain::{MigrationDefinition, MigrationResult, MigrationStatus};
use crate::ports::{MigrationSource, SqlConnection};
use crate::services::executor::MigrationExecutor;
use crate::services::ledger::MigrationLedger;

/// Progress callbacks for a run. All methods default to no-ops.
pub trait MigrationObserver {
    /// About to apply `definition`, the `position`-th (1-based) of `total`
    fn on_start(&self, _definition: &MigrationDefinition, _position: usize, _total: usize) {}

    fn on_applied(&self, _definition: &MigrationDefinition) {}

    fn on_failed(&self, _definition: &MigrationDefinition, _error: &Error) {}
}

/// Knobs for a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Apply pending migrations that sort before the latest applied one
    /// instead of refusing to run
    pub allow_out_of_order: bool,
    /// Stop after this migration (inclusive)
    pub target: Option<String>,
}

/// Brings a schema up to date with a migration source
pub struct MigrationRunner<'a> {
    conn: &'a dyn SqlConnection,
    source: &'a dyn MigrationSource,
    ledger: &'a MigrationLedger,
    options: RunOptions,
    observer: Option<&'a dyn MigrationObserver>,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(
        conn: &'a dyn SqlConnection,
        source: &'a dyn MigrationSource,
        ledger: &'a MigrationLedger,
    ) -> Self {
        Self {
            conn,
            source,
            ledger,
            options: RunOptions::default(),
            observer: None,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn MigrationObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Apply every pending migration; returns how many were applied
    pub fn run(&self) -> Result<usize> {
        Ok(self.run_report()?.applied.len())
    }

    /// Apply every pending migration in name order, stopping at the first
    /// failure. Migrations applied before the failure stay applied.
    pub fn run_report(&self) -> Result<MigrationResult> {
        self.ledger.ensure_ready(self.conn)?;
        let applied = self.ledger.applied_names(self.conn)?;
        let pending = self.select_pending(&applied)?;

        if pending.is_empty() {
            tracing::debug!(source = %self.source.describe(), "schema is up to date");
        }

        let executor = MigrationExecutor::new(self.conn, self.ledger);
        let total = pending.len();
        let mut result = MigrationResult {
            applied: Vec::with_capacity(total),
            already_applied: applied.len(),
        };

        for (i, definition) in pending.iter().enumerate() {
            if let Some(observer) = self.observer {
                observer.on_start(definition, i + 1, total);
            }

            if let Err(e) = executor.apply(definition) {
                tracing::error!(migration = %definition.name, "migration failed: {}", e);
                if let Some(observer) = self.observer {
                    observer.on_failed(definition, &e);
                }
                return Err(e);
            }

            tracing::info!(migration = %definition.name, "applied migration");
            if let Some(observer) = self.observer {
                observer.on_applied(definition);
            }
            result.applied.push(definition.name.clone());
        }

        Ok(result)
    }

    /// Names a run would apply, without touching the database
    pub fn plan(&self) -> Result<Vec<String>> {
        let applied = self.applied_if_ready()?;
        Ok(self
            .select_pending(&applied)?
            .into_iter()
            .map(|def| def.name)
            .collect())
    }

    /// Compare the source with the ledger. Read-only; a database without a
    /// ledger reports everything as pending.
    pub fn status(&self) -> Result<MigrationStatus> {
        let entries = if self.ledger.is_ready(self.conn)? {
            self.ledger.applied_entries(self.conn)?
        } else {
            Vec::new()
        };
        let definitions = self.source.list()?;

        let applied: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        let latest = entries.iter().map(|e| e.name.as_str()).max();

        let pending: Vec<String> = definitions
            .iter()
            .filter(|def| !applied.contains(def.name.as_str()))
            .map(|def| def.name.clone())
            .collect();

        let missing = entries
            .iter()
            .filter(|e| !definitions.iter().any(|def| def.name == e.name))
            .map(|e| e.name.clone())
            .collect();

        let modified = entries
            .iter()
            .filter(|e| {
                let recorded = match &e.checksum {
                    Some(c) => c,
                    None => return false,
                };
                definitions
                    .iter()
                    .any(|def| def.name == e.name && &def.checksum != recorded)
            })
            .map(|e| e.name.clone())
            .collect();

        let out_of_order = match latest {
            Some(latest) => pending
                .iter()
                .filter(|name| name.as_str() < latest)
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        Ok(MigrationStatus {
            applied: entries,
            pending,
            missing,
            modified,
            out_of_order,
        })
    }

    fn applied_if_ready(&self) -> Result<Vec<String>> {
        if self.ledger.is_ready(self.conn)? {
            self.ledger.applied_names(self.conn)
        } else {
            Ok(Vec::new())
        }
    }

    /// Pending definitions after the out-of-order guard and target cut-off
    fn select_pending(&self, applied: &[String]) -> Result<Vec<MigrationDefinition>> {
        let mut pending = self.source.list_pending(applied)?;

        if !self.options.allow_out_of_order {
            if let Some(latest) = applied.iter().max() {
                if let Some(early) = pending.iter().find(|def| &def.name < latest) {
                    return Err(Error::OutOfOrder {
                        pending: early.name.clone(),
                        applied: latest.clone(),
                    });
                }
            }
        }

        if let Some(target) = &self.options.target {
            let known =
                applied.contains(target) || pending.iter().any(|def| &def.name == target);
            if !known {
                return Err(Error::UnknownMigration(target.clone()));
            }
            pending.retain(|def| &def.name <= target);
        }

        Ok(pending)
    }
}
