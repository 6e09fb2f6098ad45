//! Doctor service - migration health checks

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbStore;
use crate::domain::MigrationStatus;
use crate::ports::MigrationSource;
use crate::services::ledger::MigrationLedger;
use crate::services::runner::MigrationRunner;

/// Doctor service for health checks
pub struct DoctorService {
    store: Arc<DuckDbStore>,
    source: Arc<dyn MigrationSource + Send + Sync>,
    ledger: MigrationLedger,
    allow_out_of_order: bool,
}

impl DoctorService {
    pub fn new(
        store: Arc<DuckDbStore>,
        source: Arc<dyn MigrationSource + Send + Sync>,
        ledger: MigrationLedger,
    ) -> Self {
        Self {
            store,
            source,
            ledger,
            allow_out_of_order: false,
        }
    }

    /// Out-of-order pending migrations are only a warning when runs allow them
    pub fn allow_out_of_order(mut self, allow: bool) -> Self {
        self.allow_out_of_order = allow;
        self
    }

    /// Run all health checks. Read-only: never creates the ledger.
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let (ledger_ready, status) = self.store.with_connection(|conn| {
            let ready = self.ledger.is_ready(conn)?;
            let status =
                MigrationRunner::new(conn, self.source.as_ref(), &self.ledger).status()?;
            Ok((ready, status))
        })?;
        let definitions = self.source.list()?;

        let mut checks = BTreeMap::new();

        checks.insert(
            "ledger".to_string(),
            if ledger_ready {
                CheckResult::pass(format!(
                    "Ledger table {} tracks {} migration(s)",
                    self.ledger.table(),
                    status.applied.len()
                ))
            } else {
                CheckResult::warning(
                    format!(
                        "Ledger table {} does not exist yet; run `tally migrate`",
                        self.ledger.table()
                    ),
                    None,
                )
            },
        );

        checks.insert(
            "pending_migrations".to_string(),
            if status.pending.is_empty() {
                CheckResult::pass("Schema is up to date")
            } else {
                CheckResult::warning(
                    format!("{} migration(s) pending", status.pending.len()),
                    Some(names(&status.pending)),
                )
            },
        );

        checks.insert(
            "missing_definitions".to_string(),
            if status.missing.is_empty() {
                CheckResult::pass("Every applied migration has a definition")
            } else {
                CheckResult::warning(
                    format!(
                        "{} applied migration(s) no longer exist in {}",
                        status.missing.len(),
                        self.source.describe()
                    ),
                    Some(names(&status.missing)),
                )
            },
        );

        checks.insert(
            "modified_migrations".to_string(),
            if status.modified.is_empty() {
                CheckResult::pass("No applied migration was edited")
            } else {
                CheckResult::warning(
                    format!(
                        "{} applied migration(s) changed since they ran",
                        status.modified.len()
                    ),
                    Some(names(&status.modified)),
                )
            },
        );

        checks.insert("out_of_order".to_string(), self.out_of_order_check(&status));

        let applied_without_reverse: Vec<String> = definitions
            .iter()
            .filter(|def| !def.has_reverse())
            .filter(|def| status.applied.iter().any(|e| e.name == def.name))
            .map(|def| def.name.clone())
            .collect();
        checks.insert(
            "reverse_scripts".to_string(),
            if applied_without_reverse.is_empty() {
                CheckResult::pass("Every applied migration can be rolled back")
            } else {
                CheckResult::warning(
                    format!(
                        "{} applied migration(s) have no down script",
                        applied_without_reverse.len()
                    ),
                    Some(names(&applied_without_reverse)),
                )
            },
        );

        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary {
                passed,
                warnings,
                errors,
            },
        })
    }

    fn out_of_order_check(&self, status: &MigrationStatus) -> CheckResult {
        if status.out_of_order.is_empty() {
            return CheckResult::pass("Pending migrations all sort after applied ones");
        }

        let message = format!(
            "{} pending migration(s) sort before the latest applied one",
            status.out_of_order.len()
        );
        let details = Some(names(&status.out_of_order));
        if self.allow_out_of_order {
            CheckResult::warning(message, details)
        } else {
            CheckResult::error(
                format!("{}; `tally migrate` will refuse to run", message),
                details,
            )
        }
    }
}

fn names(names: &[String]) -> Vec<serde_json::Value> {
    names.iter().map(|n| json!({ "migration": n })).collect()
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: "pass".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warning(message: impl Into<String>, details: Option<Vec<serde_json::Value>>) -> Self {
        Self {
            status: "warning".to_string(),
            message: message.into(),
            details,
        }
    }

    fn error(message: impl Into<String>, details: Option<Vec<serde_json::Value>>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}
