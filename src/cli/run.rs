use std::path::PathBuf;

use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::aggregator::Aggregates;
use crate::categorizer::ExclusionReason;
use crate::error::{PennyError, Result};
use crate::fmt::{money, month_name};
use crate::pipeline::prepare;
use crate::prompt::{CategoryPrompt, HeadlessPrompt, TerminalPrompt};
use crate::settings::{load_settings, ExistingCellPolicy};

fn preview(aggregates: &Aggregates, symbol: &str) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Year", "Month", "Category", "Subcategory", "Amount"]);
    for (key, amount) in aggregates.iter() {
        table.add_row(vec![
            Cell::new(key.year),
            Cell::new(month_name(key.month)),
            Cell::new(&key.pair.category),
            Cell::new(&key.pair.subcategory),
            Cell::new(money(*amount, symbol)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total"),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        Cell::new(aggregates.total().map(|t| money(t, symbol)).unwrap_or_else(|| "overflow".to_string()))
            .set_alignment(CellAlignment::Right),
    ]);
    table
}

pub fn run(
    files: Vec<PathBuf>,
    yes: bool,
    no_input: bool,
    on_existing: Option<ExistingCellPolicy>,
) -> Result<()> {
    let settings = load_settings();
    let policy = on_existing.unwrap_or(settings.on_existing);
    let mut prompt: Box<dyn CategoryPrompt> = if no_input {
        Box::new(HeadlessPrompt::new(yes))
    } else {
        Box::new(TerminalPrompt::new(&settings.currency_symbol))
    };

    let prepared = match prepare(&settings, &files, prompt.as_mut()) {
        Err(PennyError::Aborted) => {
            println!("{}", "Run cancelled; nothing was written.".yellow());
            return Ok(());
        }
        other => other?,
    };

    let n = &prepared.normalized;
    println!(
        "Read {} file(s): {} transactions, {} invalid row(s) dropped, {} duplicate row(s) dropped",
        n.files, n.rows, n.dropped_invalid, n.dropped_duplicates
    );
    for name in &n.duplicate_files {
        println!("{}", format!("Skipped {name}: identical to another file").yellow());
    }
    for ex in &prepared.categorized.excluded {
        let why = match ex.reason {
            ExclusionReason::Declined => "not categorized",
            ExclusionReason::ConflictUnresolved => "conflict not resolved",
        };
        println!(
            "{}",
            format!(
                "Excluded {} ({} transaction(s), {}): {why}",
                ex.merchant,
                ex.transactions,
                money(ex.amount, &settings.currency_symbol)
            )
            .yellow()
        );
    }

    let excluded = prepared.categorized.excluded_transactions();
    if excluded > 0 {
        println!("{excluded} transaction(s) left out of this run.");
    }
    if !prepared.conflicts.is_empty() {
        println!(
            "{}",
            format!(
                "{} stored mapping(s) point at removed categories; see `penny conflicts`.",
                prepared.conflicts.len()
            )
            .yellow()
        );
    }

    if prepared.aggregates.is_empty() {
        println!("No categorized transactions; dashboard unchanged.");
        if prepared.store_reset {
            prepared.store.save()?;
        }
        return Ok(());
    }

    println!(
        "\n{} monthly total(s)\n{}",
        prepared.aggregates.len(),
        preview(&prepared.aggregates, &settings.currency_symbol)
    );
    if !yes && !prompt.confirm("Write these amounts to the dashboard?")? {
        println!("{}", "Cancelled; nothing was written.".yellow());
        return Ok(());
    }

    let outcome = prepared.commit(policy)?;
    for yr in &outcome.reconcile.years {
        let mut parts = vec![format!("{} cell(s) written", yr.cells_written)];
        if yr.sheet_created {
            parts.insert(0, "new sheet".to_string());
        }
        if !yr.rows_appended.is_empty() {
            parts.push(format!("{} row(s) appended", yr.rows_appended.len()));
        }
        if yr.cells_skipped > 0 {
            parts.push(format!("{} cell(s) kept", yr.cells_skipped));
        }
        println!("{}: {}", yr.year.to_string().bold(), parts.join(", "));
    }
    if outcome.dashboard_saved {
        println!("{}", "Dashboard updated.".green());
    } else {
        println!("Dashboard already up to date.");
    }
    if outcome.store_saved {
        println!("Mappings saved.");
    }
    Ok(())
}
