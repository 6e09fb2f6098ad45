//! Destructive schema reset: drop every schema object, then migrate from
//! scratch

use std::collections::BTreeSet;

use crate::domain::result::{Error, Result};
use crate::domain::ResetResult;
use crate::ports::{ForeignKey, MigrationSource, ObjectKind, SchemaObject, SqlConnection};
use crate::services::executor::MigrationExecutor;
use crate::services::ledger::MigrationLedger;
use crate::services::runner::{MigrationRunner, RunOptions};

/// Order objects so each can be dropped without violating a dependency
///
/// Views first, then tables with referencing tables before the tables they
/// reference, then macros, types, sequences and schemas. Self-references are
/// ignored.
/// A foreign key cycle cannot be dropped table by table and is an error.
pub fn drop_order(
    mut objects: Vec<SchemaObject>,
    foreign_keys: &[ForeignKey],
) -> Result<Vec<SchemaObject>> {
    objects.sort();

    let (tables, others): (Vec<_>, Vec<_>) = objects
        .into_iter()
        .partition(|o| o.kind == ObjectKind::Table);

    let mut remaining: BTreeSet<SchemaObject> = tables.into_iter().collect();
    let edges: Vec<&ForeignKey> = foreign_keys
        .iter()
        .filter(|fk| fk.child != fk.parent)
        .filter(|fk| remaining.contains(&fk.child) && remaining.contains(&fk.parent))
        .collect();

    let mut ordered_tables = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .find(|table| {
                !edges
                    .iter()
                    .any(|fk| &fk.parent == *table && remaining.contains(&fk.child))
            })
            .cloned();

        match next {
            Some(table) => {
                remaining.remove(&table);
                ordered_tables.push(table);
            }
            None => {
                let cycle: Vec<String> = remaining.iter().map(ToString::to_string).collect();
                return Err(Error::destructive(
                    format!("foreign keys form a cycle between {}", cycle.join(", ")),
                    None,
                ));
            }
        }
    }

    let mut ordered = Vec::new();
    ordered.extend(others.iter().filter(|o| o.kind == ObjectKind::View).cloned());
    ordered.extend(ordered_tables);
    ordered.extend(others.into_iter().filter(|o| o.kind != ObjectKind::View));
    Ok(ordered)
}

/// Wipes a schema and rebuilds it from migrations
pub struct SchemaResetter<'a> {
    conn: &'a dyn SqlConnection,
    source: &'a dyn MigrationSource,
    ledger: &'a MigrationLedger,
    options: RunOptions,
}

impl<'a> SchemaResetter<'a> {
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
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Drop everything (ledger included) in one transaction, then run all
    /// migrations
    ///
    /// Any object that cannot be dropped aborts the reset with the schema
    /// left as it was.
    pub fn reset(&self) -> Result<ResetResult> {
        // An unreadable source must not cost the user their data
        self.source.list()?;

        let objects = self
            .conn
            .schema_objects()
            .map_err(|e| Error::destructive("cannot enumerate schema objects", Some(e)))?;
        let foreign_keys = self
            .conn
            .foreign_keys()
            .map_err(|e| Error::destructive("cannot read foreign keys", Some(e)))?;
        let ordered = drop_order(objects, &foreign_keys)?;

        tracing::warn!(objects = ordered.len(), "dropping all schema objects");

        let statements: Vec<String> = ordered.iter().map(SchemaObject::drop_statement).collect();
        MigrationExecutor::new(self.conn, self.ledger)
            .run_in_transaction("reset", &statements, |_| Ok(()))
            .map_err(|e| match e {
                Error::StatementExecution { index, cause, .. } => {
                    let object = ordered
                        .get(index)
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    Error::destructive(format!("cannot drop {}", object), Some(cause))
                }
                Error::Transaction { cause, .. } => {
                    Error::destructive("drop transaction failed", Some(cause))
                }
                other => other,
            })?;

        let report = MigrationRunner::new(self.conn, self.source, self.ledger)
            .with_options(self.options.clone())
            .run_report()?;

        Ok(ResetResult {
            dropped: ordered.iter().map(ToString::to_string).collect(),
            applied: report.applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::EmbeddedSource;
    use crate::ports::{DbError, DbResult, Row};
    use duckdb::Connection;

    struct RejectingCommit(Connection);

    impl SqlConnection for RejectingCommit {
        fn execute(&self, statement: &str) -> DbResult<()> {
            SqlConnection::execute(&self.0, statement)
        }

        fn execute_params(&self, statement: &str, params: &[&str]) -> DbResult<usize> {
            self.0.execute_params(statement, params)
        }

        fn query(&self, sql: &str, params: &[&str], width: usize) -> DbResult<Vec<Row>> {
            SqlConnection::query(&self.0, sql, params, width)
        }

        fn commit(&self) -> DbResult<()> {
            Err(DbError::Constraint("violates foreign key constraint".to_string()))
        }

        fn schema_objects(&self) -> DbResult<Vec<SchemaObject>> {
            self.0.schema_objects()
        }

        fn foreign_keys(&self) -> DbResult<Vec<ForeignKey>> {
            self.0.foreign_keys()
        }
    }

    fn table(name: &str) -> SchemaObject {
        SchemaObject::table("main", name)
    }

    fn fk(child: &str, parent: &str) -> ForeignKey {
        ForeignKey {
            child: table(child),
            parent: table(parent),
        }
    }

    fn names(objects: &[SchemaObject]) -> Vec<String> {
        objects.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_children_dropped_before_parents() {
        let objects = vec![table("accounts"), table("transactions"), table("splits")];
        let fks = vec![fk("transactions", "accounts"), fk("splits", "transactions")];

        let ordered = drop_order(objects, &fks).unwrap();

        assert_eq!(
            names(&ordered),
            vec!["table main.splits", "table main.transactions", "table main.accounts"]
        );
    }

    #[test]
    fn test_kinds_are_grouped() {
        let objects = vec![
            SchemaObject::new(ObjectKind::Schema, "budget", "budget"),
            SchemaObject::new(ObjectKind::Sequence, "main", "account_ids"),
            table("accounts"),
            SchemaObject::new(ObjectKind::View, "main", "balances"),
        ];

        let ordered = drop_order(objects, &[]).unwrap();

        assert_eq!(
            names(&ordered),
            vec![
                "view main.balances",
                "table main.accounts",
                "sequence main.account_ids",
                "schema budget"
            ]
        );
    }

    #[test]
    fn test_self_reference_ignored() {
        let ordered = drop_order(vec![table("categories")], &[fk("categories", "categories")]).unwrap();
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn test_cycle_is_destructive_error() {
        let objects = vec![table("a"), table("b")];
        let fks = vec![fk("a", "b"), fk("b", "a")];

        let err = drop_order(objects, &fks).unwrap_err();

        assert!(matches!(err, Error::DestructiveOperation { .. }));
    }

    #[test]
    fn test_reset_rebuilds_schema() {
        let conn = Connection::open_in_memory().unwrap();
        let ledger = MigrationLedger::default();
        let source = EmbeddedSource::empty()
            .with("001_init", "CREATE TABLE accounts (id INTEGER);")
            .with("002_view", "CREATE VIEW account_ids AS SELECT id FROM accounts;");
        MigrationRunner::new(&conn, &source, &ledger).run().unwrap();
        SqlConnection::execute(&conn, "CREATE TABLE scratch (id INTEGER)").unwrap();
        SqlConnection::execute(&conn, "INSERT INTO accounts VALUES (1)").unwrap();

        let result = SchemaResetter::new(&conn, &source, &ledger).reset().unwrap();

        assert_eq!(result.applied, vec!["001_init", "002_view"]);
        assert!(result.dropped.contains(&"table main.scratch".to_string()));
        assert!(!conn.table_exists("scratch").unwrap());
        let rows = SqlConnection::query(&conn, "SELECT COUNT(*)::VARCHAR FROM accounts", &[], 1).unwrap();
        assert_eq!(rows[0][0].as_deref(), Some("0"));
    }

    #[test]
    fn test_reset_with_broken_source_keeps_data() {
        let conn = Connection::open_in_memory().unwrap();
        SqlConnection::execute(&conn, "CREATE TABLE accounts (id INTEGER)").unwrap();
        let ledger = MigrationLedger::default();
        let source = EmbeddedSource::empty().with("001_broken", "SELECT 'unterminated;");

        let err = SchemaResetter::new(&conn, &source, &ledger).reset().unwrap_err();

        assert!(matches!(err, Error::InvalidScript { .. }));
        assert!(conn.table_exists("accounts").unwrap());
    }

    #[test]
    fn test_failed_drop_commit_is_destructive_error() {
        let conn = RejectingCommit(Connection::open_in_memory().unwrap());
        SqlConnection::execute(&conn, "CREATE TABLE accounts (id INTEGER)").unwrap();
        let ledger = MigrationLedger::default();
        let source = EmbeddedSource::empty().with("001_init", "CREATE TABLE accounts (id INTEGER);");

        let err = SchemaResetter::new(&conn, &source, &ledger).reset().unwrap_err();

        assert!(matches!(err, Error::DestructiveOperation { .. }), "got {:?}", err);
        assert!(conn.table_exists("accounts").unwrap());
    }

    #[test]
    fn test_types_and_macros_dropped_after_tables() {
        let objects = vec![
            SchemaObject::new(ObjectKind::Type, "main", "mood"),
            SchemaObject::new(ObjectKind::Macro, "main", "cents"),
            table("entries"),
            SchemaObject::new(ObjectKind::View, "main", "moods"),
        ];

        let ordered = drop_order(objects, &[]).unwrap();

        assert_eq!(
            names(&ordered),
            vec![
                "view main.moods",
                "table main.entries",
                "macro main.cents",
                "type main.mood"
            ]
        );
    }
}
