//! Migration source port - where migration definitions come from

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::result::{Error, Result};
use crate::domain::MigrationDefinition;

/// Enumerates available migration definitions
pub trait MigrationSource {
    /// All known definitions, sorted by name
    fn list(&self) -> Result<Vec<MigrationDefinition>>;

    /// Short human-readable description (directory path, "embedded", ...)
    fn describe(&self) -> String;

    /// Definitions whose name is not in `applied`, sort order preserved
    fn list_pending(&self, applied: &[String]) -> Result<Vec<MigrationDefinition>> {
        let applied: HashSet<&str> = applied.iter().map(String::as_str).collect();
        Ok(self
            .list()?
            .into_iter()
            .filter(|def| !applied.contains(def.name.as_str()))
            .collect())
    }

    /// Look up a single definition by name
    fn find(&self, name: &str) -> Result<Option<MigrationDefinition>> {
        Ok(self.list()?.into_iter().find(|def| def.name == name))
    }
}

fn numeric_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"^\d+[_\-.]").expect("valid regex"))
}

/// Whether a name follows the `NNN_description` convention
pub fn has_numeric_prefix(name: &str) -> bool {
    numeric_prefix().is_match(name)
}

/// Sort definitions by name and reject duplicate names
///
/// Every source funnels its output through here, so two definitions sharing
/// a name are a hard error rather than a silent single application.
pub fn sort_and_check(mut definitions: Vec<MigrationDefinition>) -> Result<Vec<MigrationDefinition>> {
    definitions.sort_by(|a, b| a.name.cmp(&b.name));

    if let Some(pair) = definitions.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(Error::DuplicateMigration(pair[0].name.clone()));
    }

    for def in &definitions {
        if !has_numeric_prefix(&def.name) {
            tracing::warn!(
                migration = %def.name,
                "migration name has no numeric prefix; lexical order decides when it runs"
            );
        }
    }

    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> MigrationDefinition {
        MigrationDefinition::from_scripts(name, "SELECT 1;", None).unwrap()
    }

    #[test]
    fn test_sort_and_check_orders_by_name() {
        let sorted =
            sort_and_check(vec![def("003_add_index"), def("001_init"), def("002_add_users")])
                .unwrap();
        let names: Vec<_> = sorted.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["001_init", "002_add_users", "003_add_index"]);
    }

    #[test]
    fn test_sort_and_check_rejects_duplicates() {
        let result = sort_and_check(vec![def("001_init"), def("002_x"), def("001_init")]);
        assert!(matches!(result, Err(Error::DuplicateMigration(name)) if name == "001_init"));
    }

    #[test]
    fn test_numeric_prefix_convention() {
        assert!(has_numeric_prefix("001_init"));
        assert!(has_numeric_prefix("20240101-accounts"));
        assert!(!has_numeric_prefix("init"));
        assert!(!has_numeric_prefix("001"));
    }
}
