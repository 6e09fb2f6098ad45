//! Configuration management
//!
//! Read from settings.json in the tally directory:
//! ```json
//! {
//!   "database": { "path": "tally.duckdb" },
//!   "migrations": {
//!     "directory": "migrations",
//!     "reverseDirectory": "migrations/down",
//!     "ledgerTable": "sys_migrations",
//!     "allowOutOfOrder": false
//!   }
//! }
//! ```
//! Relative paths are resolved against the tally directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::adapters::DirectorySource;
use crate::migrations::finance_source;
use crate::ports::MigrationSource;
use crate::services::{MigrationLedger, RunOptions, DEFAULT_LEDGER_TABLE};

/// Default database file name inside the tally directory
pub const DEFAULT_DB_FILE: &str = "tally.duckdb";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    database: DatabaseSettings,
    #[serde(default)]
    migrations: MigrationSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseSettings {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MigrationSettings {
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    reverse_directory: Option<String>,
    #[serde(default)]
    ledger_table: Option<String>,
    #[serde(default)]
    allow_out_of_order: bool,
}

/// Tally configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    /// `None` selects the embedded finance migrations
    pub migrations_dir: Option<PathBuf>,
    pub reverse_dir: Option<PathBuf>,
    pub ledger_table: String,
    pub allow_out_of_order: bool,
}

impl Config {
    /// Load config from the tally directory
    ///
    /// Environment variables take precedence over settings.json:
    /// `TALLY_DB_PATH`, `TALLY_MIGRATIONS_DIR`, `TALLY_ALLOW_OUT_OF_ORDER`.
    pub fn load(tally_dir: &Path) -> Result<Self> {
        let settings_path = tally_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %settings_path.display(), "ignoring malformed settings: {}", e);
                SettingsFile::default()
            })
        } else {
            SettingsFile::default()
        };

        Ok(Self::resolve(tally_dir, raw, |key| std::env::var(key).ok()))
    }

    fn resolve(tally_dir: &Path, raw: SettingsFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let in_dir = |p: String| {
            let path = PathBuf::from(p);
            if path.is_absolute() {
                path
            } else {
                tally_dir.join(path)
            }
        };

        let db_path = env("TALLY_DB_PATH")
            .or(raw.database.path)
            .map(in_dir)
            .unwrap_or_else(|| tally_dir.join(DEFAULT_DB_FILE));

        let migrations_dir = env("TALLY_MIGRATIONS_DIR")
            .or(raw.migrations.directory)
            .map(in_dir);

        let allow_out_of_order = parse_flag(env("TALLY_ALLOW_OUT_OF_ORDER").as_deref())
            .unwrap_or(raw.migrations.allow_out_of_order);

        Self {
            db_path,
            migrations_dir,
            reverse_dir: raw.migrations.reverse_directory.map(in_dir),
            ledger_table: raw
                .migrations
                .ledger_table
                .unwrap_or_else(|| DEFAULT_LEDGER_TABLE.to_string()),
            allow_out_of_order,
        }
    }

    /// The configured ledger; fails on a ledger table name that is not a
    /// plain identifier
    pub fn ledger(&self) -> crate::CoreResult<MigrationLedger> {
        MigrationLedger::new(self.ledger_table.clone())
    }

    /// Migration directory if configured, the embedded finance set otherwise
    pub fn source(&self) -> Arc<dyn MigrationSource + Send + Sync> {
        match &self.migrations_dir {
            Some(dir) => {
                let source = DirectorySource::new(dir);
                match &self.reverse_dir {
                    Some(reverse) => Arc::new(source.with_reverse_dir(reverse)),
                    None => Arc::new(source),
                }
            }
            None => Arc::new(finance_source()),
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            allow_out_of_order: self.allow_out_of_order,
            target: None,
        }
    }
}

fn parse_flag(value: Option<&str>) -> Option<bool> {
    match value {
        Some("true" | "1" | "yes" | "TRUE" | "YES") => Some(true),
        Some("false" | "0" | "no" | "FALSE" | "NO") => Some(false),
        _ => None,
    }
}
