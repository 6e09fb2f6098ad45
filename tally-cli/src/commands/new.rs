//! New command - scaffold a migration and its down script

use anyhow::{bail, Result};
use colored::Colorize;
use tally_core::adapters::DirectorySource;
use tally_core::config::Config;

use super::get_tally_dir;
use crate::output;

pub fn run(description: &str) -> Result<()> {
    let tally_dir = get_tally_dir()?;
    let config = Config::load(&tally_dir)?;

    let Some(dir) = &config.migrations_dir else {
        bail!(
            "No migrations directory configured; set migrations.directory in settings.json \
             or TALLY_MIGRATIONS_DIR"
        );
    };

    let mut source = DirectorySource::new(dir);
    if let Some(reverse) = &config.reverse_dir {
        source = source.with_reverse_dir(reverse);
    }

    let created = source.create_migration(description)?;

    output::success(&format!("Created {}", created.name));
    println!("  up:   {}", created.up_path.display());
    println!("  down: {}", created.down_path.display().to_string().dimmed());
    Ok(())
}
