//! CLI command implementations

pub mod doctor;
pub mod logs;
pub mod migrate;
pub mod new;
pub mod reset;
pub mod rollback;
pub mod status;

use std::error::Error as _;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use dialoguer::Confirm;
use tally_core::services::{EntryPoint, LogEvent, LoggingService};
use tally_core::TallyContext;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let tally_dir = get_tally_dir().ok()?;
    std::fs::create_dir_all(&tally_dir).ok()?;
    match LoggingService::new(&tally_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")) {
        Ok(logger) => Some(logger),
        Err(e) => {
            tracing::debug!("audit log unavailable: {:#}", e);
            None
        }
    }
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Record that a command ran, ignoring logging failures
pub fn log_command(logger: &Option<LoggingService>, command: &str) {
    if let Some(l) = logger {
        let _ = l.log_command(command);
    }
}

/// Audit event for a failed engine call: migration name and cause chain
/// included, never any row data
pub fn error_event(event: &str, command: &str, err: &tally_core::Error) -> LogEvent {
    let mut log_event = LogEvent::new(event)
        .with_command(command)
        .with_error(err.to_string());
    if let Some(migration) = err.migration() {
        log_event = log_event.with_migration(migration);
    }
    if let Some(cause) = err.source() {
        log_event = log_event.with_error_details(cause.to_string());
    }
    log_event
}

/// Get the tally directory from environment or default
pub fn get_tally_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".tally"))
        .ok_or_else(|| anyhow!("Could not find home directory; set TALLY_DIR"))
}

/// Open the tally context, creating the directory on first use
pub fn get_context() -> Result<TallyContext> {
    let tally_dir = get_tally_dir()?;

    std::fs::create_dir_all(&tally_dir)
        .with_context(|| format!("Failed to create tally directory: {:?}", tally_dir))?;

    TallyContext::new(&tally_dir).context("Failed to initialize tally context")
}

/// Ask before a destructive step
///
/// Off a terminal there is nobody to ask, so only `--force` proceeds.
pub fn confirm_destructive(prompt: &str, force: bool, json: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }
    if json || atty::isnt(atty::Stream::Stdin) {
        bail!("Refusing to continue without confirmation; re-run with --force");
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}
