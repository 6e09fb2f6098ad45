//! Directory migration source - one `.sql` file per migration
//!
//! ```text
//! migrations/
//!   001_initial_schema.sql
//!   002_uploads.sql
//!   down/
//!     001_initial_schema.sql
//! ```
//!
//! The file stem is the migration name. Reverse scripts live in a parallel
//! directory (`down/` by default) under the same file name.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::MigrationDefinition;
use crate::ports::{sort_and_check, MigrationSource};

/// Default name of the reverse-script directory inside the migrations root
pub const DOWN_DIR: &str = "down";

const EXTENSION: &str = "sql";

fn leading_number() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"^(\d+)").expect("valid regex"))
}

/// Migration name for a path, if it is a migration file
fn script_name(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !ext.eq_ignore_ascii_case(EXTENSION) {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}

/// Turn free text into a file-name-safe slug
fn slugify(description: &str) -> String {
    let mut slug = String::with_capacity(description.len());
    for c in description.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// Paths written by [`DirectorySource::create_migration`]
#[derive(Debug, Clone, Serialize)]
pub struct CreatedMigration {
    pub name: String,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
}

/// Migrations stored as files in a directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    reverse_dir: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let reverse_dir = root.join(DOWN_DIR);
        Self { root, reverse_dir }
    }

    /// Look for reverse scripts somewhere other than `<root>/down`
    pub fn with_reverse_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reverse_dir = dir.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reverse_dir(&self) -> &Path {
        &self.reverse_dir
    }

    /// An absent migrations directory is created empty, not treated as an error
    fn ensure_root(&self) -> Result<()> {
        if !self.root.exists() {
            tracing::debug!(path = %self.root.display(), "creating empty migrations directory");
            fs::create_dir_all(&self.root).map_err(|e| {
                Error::discovery(format!("cannot create {}: {}", self.root.display(), e))
            })?;
        }
        Ok(())
    }

    /// Migration files directly under `dir`, as (name, path)
    fn scripts_in(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
        let entries = fs::read_dir(dir)
            .map_err(|e| Error::discovery(format!("cannot read {}: {}", dir.display(), e)))?;

        let mut scripts = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| Error::discovery(format!("cannot read {}: {}", dir.display(), e)))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = script_name(&path) {
                scripts.push((name, path));
            }
        }
        Ok(scripts)
    }

    fn read_script(path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .map_err(|e| Error::discovery(format!("cannot read {}: {}", path.display(), e)))
    }

    /// Scaffold a new migration pair named after the next free number
    ///
    /// The number is one past the highest numeric prefix present, zero-padded
    /// to at least three digits.
    pub fn create_migration(&self, description: &str) -> Result<CreatedMigration> {
        let slug = slugify(description);
        if slug.is_empty() {
            return Err(Error::Other(
                "migration description must contain letters or digits".to_string(),
            ));
        }

        self.ensure_root()?;
        let existing = Self::scripts_in(&self.root)?;

        let mut width = 3;
        let mut highest = 0u64;
        for (name, _) in &existing {
            if let Some(digits) = leading_number().captures(name).and_then(|c| c.get(1)) {
                width = width.max(digits.as_str().len());
                if let Ok(n) = digits.as_str().parse::<u64>() {
                    highest = highest.max(n);
                }
            }
        }

        let name = format!("{:0width$}_{}", highest + 1, slug, width = width);
        let file_name = format!("{}.{}", name, EXTENSION);
        let up_path = self.root.join(&file_name);
        let down_path = self.reverse_dir.join(&file_name);

        fs::create_dir_all(&self.reverse_dir)?;
        let mut up = fs::OpenOptions::new().write(true).create_new(true).open(&up_path)?;
        writeln!(up, "-- {}", name)?;
        let mut down = fs::OpenOptions::new().write(true).create_new(true).open(&down_path)?;
        writeln!(down, "-- Reverse of {}", name)?;

        Ok(CreatedMigration {
            name,
            up_path,
            down_path,
        })
    }
}

impl MigrationSource for DirectorySource {
    fn list(&self) -> Result<Vec<MigrationDefinition>> {
        self.ensure_root()?;

        let forward = Self::scripts_in(&self.root)?;
        let reverse = if self.reverse_dir.is_dir() {
            Self::scripts_in(&self.reverse_dir)?
        } else {
            Vec::new()
        };

        for (name, path) in &reverse {
            if !forward.iter().any(|(n, _)| n == name) {
                tracing::warn!(
                    path = %path.display(),
                    "down script has no matching migration: {}", name
                );
            }
        }

        let mut definitions = Vec::with_capacity(forward.len());
        for (name, path) in &forward {
            let up = Self::read_script(path)?;
            let down = match reverse.iter().find(|(n, _)| n == name) {
                Some((_, down_path)) => Some(Self::read_script(down_path)?),
                None => None,
            };
            definitions.push(MigrationDefinition::from_scripts(
                name.as_str(),
                &up,
                down.as_deref(),
            )?);
        }

        sort_and_check(definitions)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_directory_is_created_empty() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("migrations");
        let source = DirectorySource::new(&root);

        let definitions = source.list().unwrap();

        assert!(definitions.is_empty());
        assert!(root.is_dir());
    }

    #[test]
    fn test_lists_sorted_with_reverse_scripts() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("002_add_users.sql"), "CREATE TABLE users (id INT);");
        write(&root.join("001_init.sql"), "CREATE TABLE a (id INT); CREATE TABLE b (id INT);");
        write(&root.join("down/002_add_users.sql"), "DROP TABLE users;");
        write(&root.join("README.md"), "not a migration");

        let definitions = DirectorySource::new(root).list().unwrap();

        let names: Vec<_> = definitions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["001_init", "002_add_users"]);
        assert_eq!(definitions[0].forward.len(), 2);
        assert!(definitions[0].reverse.is_none());
        assert_eq!(
            definitions[1].reverse,
            Some(vec!["DROP TABLE users".to_string()])
        );
    }

    #[test]
    fn test_list_pending_excludes_applied() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("001_init.sql"), "SELECT 1;");
        write(&root.join("002_add_users.sql"), "SELECT 2;");
        write(&root.join("003_add_index.sql"), "SELECT 3;");

        let pending = DirectorySource::new(root)
            .list_pending(&["002_add_users".to_string()])
            .unwrap();

        let names: Vec<_> = pending.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["001_init", "003_add_index"]);
    }

    #[test]
    fn test_custom_reverse_dir() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("up");
        let reverse = dir.path().join("rollback");
        write(&root.join("001_init.sql"), "CREATE TABLE a (id INT);");
        write(&reverse.join("001_init.sql"), "DROP TABLE a;");

        let source = DirectorySource::new(&root).with_reverse_dir(&reverse);
        let def = source.find("001_init").unwrap().unwrap();

        assert!(def.has_reverse());
    }

    #[test]
    fn test_invalid_script_names_the_migration() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("001_broken.sql"), "INSERT INTO t VALUES ('unterminated);");

        let err = DirectorySource::new(dir.path()).list().unwrap_err();

        assert!(matches!(err, Error::InvalidScript { ref name, .. } if name == "001_broken"));
    }

    #[test]
    fn test_create_migration_uses_next_number() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("001_init.sql"), "SELECT 1;");
        write(&root.join("007_budgets.sql"), "SELECT 7;");
        let source = DirectorySource::new(root);

        let created = source.create_migration("Add merchant names!").unwrap();

        assert_eq!(created.name, "008_add_merchant_names");
        assert!(created.up_path.exists());
        assert!(created.down_path.exists());

        // Scaffolded down script is comment-only, so it does not count yet
        let def = source.find("008_add_merchant_names").unwrap().unwrap();
        assert!(def.forward.is_empty());
        assert!(!def.has_reverse());
    }

    #[test]
    fn test_create_migration_in_empty_directory() {
        let dir = tempdir().unwrap();
        let source = DirectorySource::new(dir.path().join("migrations"));

        let created = source.create_migration("initial schema").unwrap();

        assert_eq!(created.name, "001_initial_schema");
    }

    #[test]
    fn test_create_migration_rejects_blank_description() {
        let dir = tempdir().unwrap();
        let source = DirectorySource::new(dir.path());
        assert!(source.create_migration(" -- ").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add merchant names!"), "add_merchant_names");
        assert_eq!(slugify("  split--categories  "), "split_categories");
    }
}
