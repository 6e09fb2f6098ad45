//! Migration entities

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::script;

/// A named, ordered unit of schema change
///
/// Names are compared lexically and that order is the application order,
/// so authors use zero-padded numeric prefixes (`001_init`, `002_...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDefinition {
    pub name: String,
    /// Forward statements, in file order
    pub forward: Vec<String>,
    /// Reverse statements, if a down script exists
    pub reverse: Option<Vec<String>>,
    /// SHA-256 of the raw forward script
    pub checksum: String,
}

impl MigrationDefinition {
    /// Build a definition from raw scripts, splitting them into statements
    ///
    /// A down script with no statements (empty, or comments only) counts as
    /// no down script at all.
    pub fn from_scripts(
        name: impl Into<String>,
        forward_sql: &str,
        reverse_sql: Option<&str>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::discovery("migration name must not be empty"));
        }

        let forward = script::split_statements(forward_sql).map_err(|e| Error::InvalidScript {
            name: name.clone(),
            message: e.to_string(),
        })?;

        let reverse = reverse_sql
            .map(|sql| {
                script::split_statements(sql).map_err(|e| Error::InvalidScript {
                    name: name.clone(),
                    message: format!("down script: {}", e),
                })
            })
            .transpose()?
            .filter(|statements| !statements.is_empty());

        Ok(Self {
            checksum: script::checksum(forward_sql),
            name,
            forward,
            reverse,
        })
    }

    pub fn has_reverse(&self) -> bool {
        self.reverse.is_some()
    }
}

/// A ledger row: one applied migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub name: String,
    pub applied_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Result of running migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationResult {
    /// Names of newly applied migrations
    pub applied: Vec<String>,
    /// Count of migrations that were already applied
    pub already_applied: usize,
}

/// Snapshot of source vs. ledger
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationStatus {
    /// Ledger entries in applied order
    pub applied: Vec<LedgerEntry>,
    /// Known definitions without a ledger entry
    pub pending: Vec<String>,
    /// Ledger entries without a definition
    pub missing: Vec<String>,
    /// Applied migrations whose script changed since
    pub modified: Vec<String>,
    /// Pending migrations that sort before the latest applied one
    pub out_of_order: Vec<String>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Result of a destructive schema reset
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResetResult {
    /// Objects dropped, in drop order
    pub dropped: Vec<String>,
    /// Migrations applied afterwards
    pub applied: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_scripts_splits_both_directions() {
        let def = MigrationDefinition::from_scripts(
            "004_add_column",
            "ALTER TABLE accounts ADD COLUMN nickname VARCHAR;",
            Some("ALTER TABLE accounts DROP COLUMN nickname;"),
        )
        .unwrap();

        assert_eq!(def.name, "004_add_column");
        assert_eq!(def.forward, vec!["ALTER TABLE accounts ADD COLUMN nickname VARCHAR"]);
        assert_eq!(
            def.reverse,
            Some(vec!["ALTER TABLE accounts DROP COLUMN nickname".to_string()])
        );
        assert_eq!(def.checksum.len(), 64);
        assert!(def.has_reverse());
    }

    #[test]
    fn test_comment_only_down_script_counts_as_absent() {
        let def = MigrationDefinition::from_scripts(
            "005_uploads",
            "CREATE TABLE uploads (id VARCHAR);",
            Some("-- Reverse of 005_uploads\n"),
        )
        .unwrap();
        assert!(!def.has_reverse());
    }

    #[test]
    fn test_from_scripts_rejects_empty_name() {
        let result = MigrationDefinition::from_scripts("  ", "SELECT 1;", None);
        assert!(matches!(result, Err(Error::Discovery(_))));
    }

    #[test]
    fn test_from_scripts_reports_invalid_down_script() {
        let result =
            MigrationDefinition::from_scripts("001_init", "SELECT 1;", Some("SELECT 'oops"));
        match result {
            Err(Error::InvalidScript { name, message }) => {
                assert_eq!(name, "001_init");
                assert!(message.starts_with("down script"));
            }
            other => panic!("expected InvalidScript, got {:?}", other),
        }
    }
}
