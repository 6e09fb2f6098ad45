//! Embedded migration source - scripts compiled into the binary
//!
//! Also used to build migration sets in memory (tests, programmatic schemas).

use crate::domain::result::Result;
use crate::domain::MigrationDefinition;
use crate::ports::{sort_and_check, MigrationSource};

/// A migration embedded with `include_str!`
///
/// `name` may carry a `.sql` extension; it is stripped to form the
/// migration name.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedMigration {
    pub name: &'static str,
    pub up: &'static str,
    pub down: Option<&'static str>,
}

fn strip_extension(name: &str) -> &str {
    name.strip_suffix(".sql").unwrap_or(name)
}

/// In-memory migration source
#[derive(Debug, Clone, Default)]
pub struct EmbeddedSource {
    entries: Vec<(String, String, Option<String>)>,
    label: Option<String>,
}

impl EmbeddedSource {
    pub fn new(migrations: &[EmbeddedMigration]) -> Self {
        Self {
            entries: migrations
                .iter()
                .map(|m| {
                    (
                        strip_extension(m.name).to_string(),
                        m.up.to_string(),
                        m.down.map(str::to_string),
                    )
                })
                .collect(),
            label: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a forward-only migration
    pub fn with(mut self, name: &str, up: &str) -> Self {
        self.entries
            .push((strip_extension(name).to_string(), up.to_string(), None));
        self
    }

    /// Add a migration with a down script
    pub fn with_reversible(mut self, name: &str, up: &str, down: &str) -> Self {
        self.entries.push((
            strip_extension(name).to_string(),
            up.to_string(),
            Some(down.to_string()),
        ));
        self
    }

    /// Name shown by `describe()`
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MigrationSource for EmbeddedSource {
    fn list(&self) -> Result<Vec<MigrationDefinition>> {
        let definitions = self
            .entries
            .iter()
            .map(|(name, up, down)| {
                MigrationDefinition::from_scripts(name.as_str(), up, down.as_deref())
            })
            .collect::<Result<Vec<_>>>()?;

        sort_and_check(definitions)
    }

    fn describe(&self) -> String {
        self.label.clone().unwrap_or_else(|| "embedded".to_string())
    }
}
