//! Status command - applied and pending migrations

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use serde_json::json;

use super::get_context;
use crate::output::{self, create_table, format_applied_at, format_size};

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.migrations(|svc| svc.status())?;
    let database = ctx
        .store
        .db_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ":memory:".to_string());

    if json {
        return output::json(&json!({
            "database": database,
            "source": ctx.source.describe(),
            "ledger_table": ctx.ledger.table(),
            "status": status,
        }));
    }

    println!("{}", "Migration Status".bold());
    println!(
        "  Database: {} ({})",
        database,
        format_size(ctx.store.get_db_size()?)
    );
    println!("  Source:   {}", ctx.source.describe());
    println!();

    if status.applied.is_empty() && status.pending.is_empty() {
        output::info("No migrations found");
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["Migration", "State", "Applied At"]);

    for entry in &status.applied {
        let state = if status.missing.contains(&entry.name) {
            Cell::new("missing").fg(Color::Red)
        } else if status.modified.contains(&entry.name) {
            Cell::new("modified").fg(Color::Yellow)
        } else {
            Cell::new("applied").fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new(&entry.name),
            state,
            Cell::new(format_applied_at(&entry.applied_at)),
        ]);
    }
    for name in &status.pending {
        let state = if status.out_of_order.contains(name) {
            Cell::new("pending (out of order)").fg(Color::Red)
        } else {
            Cell::new("pending").fg(Color::Yellow)
        };
        table.add_row(vec![Cell::new(name), state, Cell::new("")]);
    }

    println!("{}", table);
    println!();
    if status.is_up_to_date() {
        println!("{} applied, up to date", status.applied.len().to_string().green());
    } else {
        println!(
            "{} applied, {} pending",
            status.applied.len().to_string().green(),
            status.pending.len().to_string().yellow()
        );
    }

    if !status.out_of_order.is_empty() && !ctx.config.allow_out_of_order {
        output::warning(
            "Some pending migrations sort before applied ones; `tally migrate` will refuse to run \
             until they are renamed or allowOutOfOrder is set",
        );
    }

    Ok(())
}
