use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::categorizer::Categorizer;
use crate::conflicts::{detect_conflicts, stale_rows};
use crate::error::{PennyError, Result};
use crate::mapping::MappingStore;
use crate::pipeline::load_dashboard;
use crate::prompt::TerminalPrompt;
use crate::settings::load_settings;

pub fn list() -> Result<()> {
    let settings = load_settings();
    let (workbook, taxonomy, _) = load_dashboard(&settings)?;
    let store = MappingStore::load(&settings.mapping_path())?;
    let conflicts = detect_conflicts(&taxonomy, &store);

    if conflicts.is_empty() {
        println!("{}", "No mapping conflicts.".green());
    } else {
        let mut table = Table::new();
        table.set_header(vec!["Merchant", "Mapped to", "Problem"]);
        for c in conflicts.iter() {
            table.add_row(vec![
                Cell::new(&c.merchant),
                Cell::new(&c.target),
                Cell::new(c.kind),
            ]);
        }
        println!("Conflicts\n{table}");
        println!("Run `penny remap` to resolve them.");
    }

    let stale = stale_rows(&taxonomy, &workbook)?;
    if !stale.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Sheet", "Row", "Category", "Subcategory"]);
        for s in &stale {
            table.add_row(vec![
                Cell::new(&s.sheet),
                Cell::new(s.row + 1),
                Cell::new(&s.key.category),
                Cell::new(&s.key.subcategory),
            ]);
        }
        println!("\nDashboard rows no longer in the Template (kept as-is)\n{table}");
    }
    Ok(())
}

pub fn remap() -> Result<()> {
    let settings = load_settings();
    let (_, taxonomy, _) = load_dashboard(&settings)?;
    let mut store = MappingStore::load(&settings.mapping_path())?;
    let conflicts = detect_conflicts(&taxonomy, &store);

    if conflicts.is_empty() {
        println!("{}", "No mapping conflicts.".green());
        return Ok(());
    }
    println!("\n{} mapping(s) to remap\n", conflicts.len());

    let mut prompt = TerminalPrompt::new(&settings.currency_symbol);
    let updates = match Categorizer::new(&taxonomy, &conflicts).remap(&mut store, &mut prompt) {
        Err(PennyError::Aborted) => {
            println!("{}", "Remap cancelled; nothing was saved.".yellow());
            return Ok(());
        }
        other => other?,
    };

    if updates.is_empty() {
        println!("Nothing changed.");
        return Ok(());
    }
    store.save()?;
    let left = conflicts.len() - updates.len();
    println!("{}", format!("Remapped {} merchant(s).", updates.len()).green());
    if left > 0 {
        println!("{}", format!("{left} conflict(s) left for later.").yellow());
    }
    Ok(())
}
