//! Reverting applied migrations with their down scripts

use crate::domain::result::{Error, Result};
use crate::ports::{MigrationSource, SqlConnection};
use crate::services::executor::MigrationExecutor;
use crate::services::ledger::MigrationLedger;

pub struct RollbackCoordinator<'a> {
    conn: &'a dyn SqlConnection,
    source: &'a dyn MigrationSource,
    ledger: &'a MigrationLedger,
}

impl<'a> RollbackCoordinator<'a> {
    pub fn new(
        conn: &'a dyn SqlConnection,
        source: &'a dyn MigrationSource,
        ledger: &'a MigrationLedger,
    ) -> Self {
        Self {
            conn,
            source,
            ledger,
        }
    }

    /// Revert `name` and delete its ledger entry, atomically
    ///
    /// Reverting a migration that is not the most recently applied one, or
    /// that was never applied, is allowed: the down script decides whether
    /// that makes sense.
    pub fn rollback(&self, name: &str) -> Result<()> {
        let definition = self
            .source
            .find(name)?
            .ok_or_else(|| Error::UnknownMigration(name.to_string()))?;

        if !definition.has_reverse() {
            return Err(Error::NoDownMigration(name.to_string()));
        }

        self.ledger.ensure_ready(self.conn)?;
        let applied = self.ledger.applied_names(self.conn)?;
        if !applied.iter().any(|n| n == name) {
            tracing::warn!(migration = name, "rolling back a migration that is not applied");
        } else if applied.last().map(String::as_str) != Some(name) {
            tracing::warn!(
                migration = name,
                "rolling back a migration that is not the most recent one"
            );
        }

        MigrationExecutor::new(self.conn, self.ledger).revert(&definition)?;
        tracing::info!(migration = name, "rolled back migration");
        Ok(())
    }

    /// Revert the most recently applied migration, if any
    pub fn rollback_last(&self) -> Result<Option<String>> {
        if !self.ledger.is_ready(self.conn)? {
            return Ok(None);
        }

        match self.ledger.applied_names(self.conn)?.pop() {
            Some(last) => {
                self.rollback(&last)?;
                Ok(Some(last))
            }
            None => Ok(None),
        }
    }
}
