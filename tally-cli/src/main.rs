//! Tally CLI - schema migrations for your finance database

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{doctor, logs, migrate, new, reset, rollback, status};

/// Tally - personal finance in your terminal
#[derive(Parser)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging, check details)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Migrate {
        /// Stop after this migration
        #[arg(long)]
        to: Option<String>,
        /// List what would be applied without applying it
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show applied and pending migrations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Roll back a migration (the most recent one by default)
    Rollback {
        /// Migration to roll back
        name: Option<String>,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop every schema object and re-run all migrations
    Reset {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new migration in the migrations directory
    New {
        /// What the migration does, e.g. "add merchant names"
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,
    },

    /// Run migration health checks
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the audit log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

/// Diagnostics go to stderr; `TALLY_LOG` takes an `EnvFilter` directive
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Migrate { to, dry_run, json } => migrate::run(to, dry_run, json),
        Commands::Status { json } => status::run(json),
        Commands::Rollback { name, force, json } => rollback::run(name, force, json),
        Commands::Reset { force, json } => reset::run(force, json),
        Commands::New { description } => new::run(&description.join(" ")),
        Commands::Doctor { json } => doctor::run(cli.verbose, json),
        Commands::Logs { command } => logs::run(command),
    }
}
