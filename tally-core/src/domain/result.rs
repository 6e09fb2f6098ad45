//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::DbError;

/// Core library error type
///
/// Every failure raised while applying, rolling back or resetting carries
/// enough context (migration name, statement index, cause) to fix the
/// offending script and re-run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Migration discovery failed: {0}")]
    Discovery(String),

    #[error("Invalid migration script '{name}': {message}")]
    InvalidScript { name: String, message: String },

    #[error("Duplicate migration: {0}")]
    DuplicateMigration(String),

    #[error("Migration '{migration}' failed at statement {index}: {cause}")]
    StatementExecution {
        migration: String,
        index: usize,
        #[source]
        cause: DbError,
    },

    #[error("Transaction for '{migration}' failed: {cause}")]
    Transaction {
        migration: String,
        #[source]
        cause: DbError,
    },

    #[error("Unknown migration: {0}")]
    UnknownMigration(String),

    #[error("Migration '{0}' has no down migration")]
    NoDownMigration(String),

    #[error("Migration '{pending}' is pending but sorts before already applied '{applied}'")]
    OutOfOrder { pending: String, applied: String },

    #[error("Schema reset failed: {message}")]
    DestructiveOperation {
        message: String,
        #[source]
        cause: Option<DbError>,
    },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a reset error, optionally wrapping the database cause
    pub fn destructive(msg: impl Into<String>, cause: Option<DbError>) -> Self {
        Self::DestructiveOperation {
            message: msg.into(),
            cause,
        }
    }

    /// Name of the migration this error is about, if any
    pub fn migration(&self) -> Option<&str> {
        match self {
            Self::InvalidScript { name, .. } => Some(name),
            Self::DuplicateMigration(name)
            | Self::UnknownMigration(name)
            | Self::NoDownMigration(name) => Some(name),
            Self::StatementExecution { migration, .. } | Self::Transaction { migration, .. } => {
                Some(migration)
            }
            Self::OutOfOrder { pending, .. } => Some(pending),
            _ => None,
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                let mut context = HashMap::new();
                if let Some(name) = e.migration() {
                    context.insert("migration".to_string(), serde_json::json!(name));
                }
                if let Error::StatementExecution { index, .. } = &e {
                    context.insert("statement_index".to_string(), serde_json::json!(index));
                }
                if context.is_empty() {
                    Self::fail(e.to_string())
                } else {
                    Self::fail_with_context(e.to_string(), context)
                }
            }
        }
    }
}
