//! Database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary at build time using include_str!.
//! They are used whenever settings.json names no migrations directory.

use crate::adapters::{EmbeddedMigration, EmbeddedSource};

/// All finance schema migrations, embedded at compile time.
///
/// IMPORTANT: When adding a new migration:
/// 1. Create the SQL file: NNN_description.sql
/// 2. Create its reverse in down/NNN_description.sql
/// 3. Add an entry here
pub const MIGRATIONS: &[EmbeddedMigration] = &[
    EmbeddedMigration {
        name: "001_initial_schema.sql",
        up: include_str!("001_initial_schema.sql"),
        down: Some(include_str!("down/001_initial_schema.sql")),
    },
    EmbeddedMigration {
        name: "002_uploads.sql",
        up: include_str!("002_uploads.sql"),
        down: Some(include_str!("down/002_uploads.sql")),
    },
    EmbeddedMigration {
        name: "003_categorization_rules.sql",
        up: include_str!("003_categorization_rules.sql"),
        down: Some(include_str!("down/003_categorization_rules.sql")),
    },
    EmbeddedMigration {
        name: "004_transaction_indexes.sql",
        up: include_str!("004_transaction_indexes.sql"),
        down: Some(include_str!("down/004_transaction_indexes.sql")),
    },
    EmbeddedMigration {
        name: "005_account_balances.sql",
        up: include_str!("005_account_balances.sql"),
        down: Some(include_str!("down/005_account_balances.sql")),
    },
];

/// The finance schema as a migration source
pub fn finance_source() -> EmbeddedSource {
    EmbeddedSource::new(MIGRATIONS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MigrationSource;

    #[test]
    fn test_every_migration_parses_and_is_reversible() {
        let definitions = finance_source().list().unwrap();

        assert_eq!(definitions.len(), MIGRATIONS.len());
        for def in &definitions {
            assert!(!def.forward.is_empty(), "{} has no statements", def.name);
            assert!(def.has_reverse(), "{} has no down script", def.name);
        }
        assert_eq!(definitions[0].forward.len(), 3);
    }
}
