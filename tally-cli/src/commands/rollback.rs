//! Rollback command - revert one migration with its down script

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use tally_core::services::LogEvent;
use tally_core::OperationResult;

use super::{
    confirm_destructive, error_event, get_context, get_logger, log_command, log_event,
};
use crate::output;

pub fn run(name: Option<String>, force: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let logger = get_logger();
    log_command(&logger, "rollback");

    let target = match name {
        Some(name) => name,
        None => match ctx.migrations(|svc| svc.get_applied())?.pop() {
            Some(latest) => latest,
            None => {
                if json {
                    return output::json(&OperationResult::ok(json!({ "rolled_back": null })));
                }
                output::info("No applied migrations to roll back");
                return Ok(());
            }
        },
    };

    let prompt = format!("Roll back {}? Its down script will run now.", target);
    if !confirm_destructive(&prompt, force, json)? {
        println!("{}", "Cancelled".dimmed());
        return Ok(());
    }

    match ctx.migrations(|svc| svc.rollback(&target)) {
        Ok(()) => {
            log_event(
                &logger,
                LogEvent::new("migration_rolled_back")
                    .with_command("rollback")
                    .with_migration(&target),
            );
            if json {
                return output::json(&OperationResult::ok(json!({ "rolled_back": target })));
            }
            output::success(&format!("Rolled back {}", target));
            Ok(())
        }
        Err(e) => {
            log_event(&logger, error_event("rollback_failed", "rollback", &e));
            if json {
                output::json(&OperationResult::<()>::from(Err(e)))?;
                std::process::exit(1);
            }
            Err(e.into())
        }
    }
}
