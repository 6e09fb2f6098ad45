//! Connection port - the only database surface the migration engine uses
//!
//! Sync, async-wrapped and pooled handles all reduce to this: run one
//! statement, bracket a transaction, read a few string columns and list the
//! schema's own objects. Adapters implement it per driver.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Failure reported by a connection adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// Unique / primary key / check constraint violated
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("{0}")]
    Execution(String),

    #[error("connection unavailable: {0}")]
    Connection(String),
}

impl DbError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }
}

/// Result type for connection operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// A row of string-cast columns (`NULL` → `None`)
pub type Row = Vec<Option<String>>;

/// Kind of schema object, in the order a reset drops them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    View,
    Table,
    Macro,
    TableMacro,
    Type,
    Sequence,
    Schema,
}

impl ObjectKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            ObjectKind::View => "VIEW",
            ObjectKind::Table => "TABLE",
            ObjectKind::Macro => "MACRO",
            ObjectKind::TableMacro => "MACRO TABLE",
            ObjectKind::Type => "TYPE",
            ObjectKind::Sequence => "SEQUENCE",
            ObjectKind::Schema => "SCHEMA",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectKind::View => "view",
            ObjectKind::Table => "table",
            ObjectKind::Macro => "macro",
            ObjectKind::TableMacro => "table macro",
            ObjectKind::Type => "type",
            ObjectKind::Sequence => "sequence",
            ObjectKind::Schema => "schema",
        }
    }
}

/// A schema-owned object (never an engine-internal one)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SchemaObject {
    pub kind: ObjectKind,
    pub schema: String,
    pub name: String,
}

impl SchemaObject {
    pub fn new(kind: ObjectKind, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn table(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ObjectKind::Table, schema, name)
    }

    /// Quoted, schema-qualified name for use in DDL
    pub fn qualified_name(&self) -> String {
        match self.kind {
            ObjectKind::Schema => quote_ident(&self.name),
            _ => format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name)),
        }
    }

    /// `DROP <kind> <name>` - strict, no `IF EXISTS`
    pub fn drop_statement(&self) -> String {
        format!("DROP {} {}", self.kind.keyword(), self.qualified_name())
    }
}

impl fmt::Display for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ObjectKind::Schema => write!(f, "schema {}", self.name),
            kind => write!(
                f,
                "{} {}.{}",
                kind.label(),
                self.schema,
                self.name
            ),
        }
    }
}

/// `child` holds a foreign key referencing `parent`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub child: SchemaObject,
    pub parent: SchemaObject,
}

/// Schema that unqualified names resolve to
pub const DEFAULT_SCHEMA: &str = "main";

/// Quote an identifier with double quotes, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Database connection abstraction
///
/// Implementations must run each call on the same underlying session so that
/// `begin` / `commit` bracket everything executed in between.
pub trait SqlConnection {
    /// Execute a single statement
    fn execute(&self, statement: &str) -> DbResult<()>;

    /// Execute a statement with positional string parameters, returning the
    /// number of affected rows
    fn execute_params(&self, statement: &str, params: &[&str]) -> DbResult<usize>;

    /// Run a query and return the first `width` columns of every row. Callers
    /// cast non-text columns to VARCHAR in SQL.
    fn query(&self, sql: &str, params: &[&str], width: usize) -> DbResult<Vec<Row>>;

    fn begin(&self) -> DbResult<()> {
        self.execute("BEGIN TRANSACTION")
    }

    fn commit(&self) -> DbResult<()> {
        self.execute("COMMIT")
    }

    fn rollback(&self) -> DbResult<()> {
        self.execute("ROLLBACK")
    }

    /// All user-owned views, tables, macros, types, sequences and non-default
    /// schemas of the current database, excluding internal and temporary
    /// objects
    fn schema_objects(&self) -> DbResult<Vec<SchemaObject>>;

    /// Foreign keys between user tables
    fn foreign_keys(&self) -> DbResult<Vec<ForeignKey>>;

    /// Whether a table with this name exists in the default schema
    fn table_exists(&self, name: &str) -> DbResult<bool> {
        Ok(self
            .schema_objects()?
            .iter()
            .any(|o| {
                o.kind == ObjectKind::Table && o.schema == DEFAULT_SCHEMA && o.name == name
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_statement_quotes_names() {
        let table = SchemaObject::table("main", "transactions");
        assert_eq!(table.drop_statement(), r#"DROP TABLE "main"."transactions""#);

        let odd = SchemaObject::new(ObjectKind::View, "main", r#"weird"name"#);
        assert_eq!(odd.drop_statement(), r#"DROP VIEW "main"."weird""name""#);

        let schema = SchemaObject::new(ObjectKind::Schema, "budget", "budget");
        assert_eq!(schema.drop_statement(), r#"DROP SCHEMA "budget""#);

        let macro_table = SchemaObject::new(ObjectKind::TableMacro, "main", "recent");
        assert_eq!(macro_table.drop_statement(), r#"DROP MACRO TABLE "main"."recent""#);

        let mood = SchemaObject::new(ObjectKind::Type, "main", "mood");
        assert_eq!(mood.drop_statement(), r#"DROP TYPE "main"."mood""#);
    }

    #[test]
    fn test_object_kind_orders_views_before_tables() {
        let mut kinds = vec![
            ObjectKind::Schema,
            ObjectKind::Type,
            ObjectKind::Sequence,
            ObjectKind::Macro,
            ObjectKind::Table,
            ObjectKind::View,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ObjectKind::View,
                ObjectKind::Table,
                ObjectKind::Macro,
                ObjectKind::Type,
                ObjectKind::Sequence,
                ObjectKind::Schema
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SchemaObject::table("main", "accounts").to_string(),
            "table main.accounts"
        );
        assert_eq!(
            SchemaObject::new(ObjectKind::Schema, "budget", "budget").to_string(),
            "schema budget"
        );
        assert_eq!(
            SchemaObject::new(ObjectKind::TableMacro, "main", "recent").to_string(),
            "table macro main.recent"
        );
        assert!(DbError::Constraint("dup".into()).is_constraint_violation());
        assert!(!DbError::Execution("boom".into()).is_constraint_violation());
    }
}
