//! Transactional application of one migration

use crate::domain::result::{Error, Result};
use crate::domain::MigrationDefinition;
use crate::ports::SqlConnection;
use crate::services::ledger::MigrationLedger;

/// Runs one migration's statements and its ledger change as a single
/// all-or-nothing unit
pub struct MigrationExecutor<'a> {
    conn: &'a dyn SqlConnection,
    ledger: &'a MigrationLedger,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(conn: &'a dyn SqlConnection, ledger: &'a MigrationLedger) -> Self {
        Self { conn, ledger }
    }

    /// Execute the forward statements and record the migration
    ///
    /// A commit rejected by the ledger's unique constraint means another run
    /// recorded the migration first.
    pub fn apply(&self, definition: &MigrationDefinition) -> Result<()> {
        self.run_in_transaction(&definition.name, &definition.forward, |conn| {
            self.ledger
                .record(conn, &definition.name, Some(&definition.checksum))
                .map_err(|e| match e {
                    Error::Database(cause) => Error::Transaction {
                        migration: definition.name.clone(),
                        cause,
                    },
                    other => other,
                })
        })
        .map_err(|e| match e {
            Error::Transaction { migration, cause } if cause.is_constraint_violation() => {
                Error::DuplicateMigration(migration)
            }
            other => other,
        })
    }

    /// Execute the reverse statements and remove the ledger entry
    pub fn revert(&self, definition: &MigrationDefinition) -> Result<()> {
        let reverse = definition
            .reverse
            .as_ref()
            .ok_or_else(|| Error::NoDownMigration(definition.name.clone()))?;

        self.run_in_transaction(&definition.name, reverse, |conn| {
            self.ledger
                .remove(conn, &definition.name)
                .map(|_| ())
                .map_err(|e| match e {
                    Error::Database(cause) => Error::Transaction {
                        migration: definition.name.clone(),
                        cause,
                    },
                    other => other,
                })
        })
    }

    /// Run `statements` then `finish` inside one transaction
    ///
    /// Any failure rolls everything back. A statement failure is reported
    /// with its zero-based index under `label`.
    pub fn run_in_transaction<F>(&self, label: &str, statements: &[String], finish: F) -> Result<()>
    where
        F: FnOnce(&dyn SqlConnection) -> Result<()>,
    {
        self.conn.begin().map_err(|cause| Error::Transaction {
            migration: label.to_string(),
            cause,
        })?;

        match self.execute_all(label, statements, finish) {
            Ok(()) => self.conn.commit().map_err(|cause| {
                // Commit can still fail on a deferred unique check
                self.roll_back(label);
                Error::Transaction {
                    migration: label.to_string(),
                    cause,
                }
            }),
            Err(e) => {
                self.roll_back(label);
                Err(e)
            }
        }
    }

    fn execute_all<F>(&self, label: &str, statements: &[String], finish: F) -> Result<()>
    where
        F: FnOnce(&dyn SqlConnection) -> Result<()>,
    {
        for (index, statement) in statements.iter().enumerate() {
            tracing::debug!(migration = label, index, "executing statement");
            self.conn
                .execute(statement)
                .map_err(|cause| Error::StatementExecution {
                    migration: label.to_string(),
                    index,
                    cause,
                })?;
        }
        finish(self.conn)
    }

    fn roll_back(&self, label: &str) {
        if let Err(e) = self.conn.rollback() {
            // Nothing left to undo when the engine already aborted the transaction
            tracing::debug!(migration = label, "rollback after failure: {}", e);
        }
    }
}
