//! Reset command - drop the whole schema and migrate from scratch

use anyhow::Result;
use colored::Colorize;
use tally_core::services::LogEvent;
use tally_core::{OperationResult, ResetResult};

use super::{
    confirm_destructive, error_event, get_context, get_logger, log_command, log_event,
};
use crate::output;

pub fn run(force: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();
    log_command(&logger, "reset");

    let database = ctx
        .store
        .db_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ":memory:".to_string());

    if !force && !json {
        println!(
            "\n{}",
            format!(
                "This drops every table, view, sequence and schema in {}.",
                database
            )
            .yellow()
        );
        println!("{}\n", "All data will be lost.".red());
    }
    if !confirm_destructive("Reset the database?", force, json)? {
        println!("{}", "Cancelled".dimmed());
        return Ok(());
    }

    match ctx.migrations(|svc| svc.reset()) {
        Ok(result) => {
            log_event(
                &logger,
                LogEvent::new("schema_reset").with_command("reset"),
            );
            if json {
                return output::json(&OperationResult::ok(result));
            }
            output::success(&format!(
                "Dropped {} object(s), applied {} migration(s)",
                result.dropped.len(),
                result.applied.len()
            ));
            Ok(())
        }
        Err(e) => {
            log_event(&logger, error_event("reset_failed", "reset", &e));
            if json {
                output::json(&OperationResult::<ResetResult>::from(Err(e)))?;
                std::process::exit(1);
            }
            Err(e.into())
        }
    }
}
