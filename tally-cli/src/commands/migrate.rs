//! Migrate command - apply pending migrations

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tally_core::services::{LogEvent, MigrationObserver};
use tally_core::{MigrationDefinition, MigrationResult, OperationResult};

use super::{error_event, get_context, get_logger, log_command, log_event};
use crate::output;

/// Drives a progress bar from engine callbacks
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl MigrationObserver for ProgressObserver {
    fn on_start(&self, definition: &MigrationDefinition, _position: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message(definition.name.clone());
    }

    fn on_applied(&self, _definition: &MigrationDefinition) {
        self.bar.inc(1);
    }

    fn on_failed(&self, definition: &MigrationDefinition, _error: &tally_core::Error) {
        self.bar
            .abandon_with_message(format!("{} failed", definition.name));
    }
}

pub fn run(to: Option<String>, dry_run: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();
    log_command(&logger, "migrate");

    let mut options = ctx.config.run_options();
    options.target = to;

    if dry_run {
        let plan = ctx.migrations(|svc| svc.with_options(options).plan())?;
        if json {
            return output::json(&json!({ "dry_run": true, "pending": plan }));
        }
        if plan.is_empty() {
            output::info("Schema is up to date");
        } else {
            println!("Would apply {} migration(s):", plan.len());
            for name in &plan {
                println!("  {}", name);
            }
        }
        return Ok(());
    }

    let observer = ProgressObserver::new(!json && atty::is(atty::Stream::Stderr));
    let result = ctx.migrations(|svc| {
        svc.with_options(options)
            .with_observer(&observer)
            .run_pending()
    });
    observer.bar.finish_and_clear();

    match result {
        Ok(report) => {
            for name in &report.applied {
                log_event(
                    &logger,
                    LogEvent::new("migration_applied")
                        .with_command("migrate")
                        .with_migration(name),
                );
            }

            if json {
                return output::json(&OperationResult::ok(report));
            }

            if report.applied.is_empty() {
                output::info(&format!(
                    "Schema is up to date ({} migration(s) applied)",
                    report.already_applied
                ));
            } else {
                output::success(&format!("Applied {} migration(s):", report.applied.len()));
                for name in &report.applied {
                    println!("  {}", name);
                }
            }
            Ok(())
        }
        Err(e) => {
            log_event(&logger, error_event("migration_failed", "migrate", &e));
            if json {
                output::json(&OperationResult::<MigrationResult>::from(Err(e)))?;
                std::process::exit(1);
            }
            Err(e.into())
        }
    }
}
