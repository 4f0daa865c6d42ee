use std::collections::HashSet;
use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::conflicts::detect_conflicts;
use crate::error::Result;
use crate::importer::read_template_pairs;
use crate::mapping::MappingStore;
use crate::models::CategoryPair;
use crate::pipeline::load_dashboard;
use crate::settings::load_settings;
use crate::taxonomy::Taxonomy;
use crate::workbook::Workbook;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let (_, taxonomy, warnings) = load_dashboard(&settings)?;

    let mut table = Table::new();
    table.set_header(vec!["Category", "Subcategories"]);
    for cat in taxonomy.categories() {
        table.add_row(vec![
            Cell::new(&cat.name),
            Cell::new(cat.subcategories.join(", ")),
        ]);
    }
    println!("Template ({})\n{table}", settings.template_sheet);
    println!(
        "{} categories, {} subcategories",
        taxonomy.categories().len(),
        taxonomy.pair_count()
    );
    for w in &warnings {
        println!("{} {w}", "Warning:".yellow());
    }
    Ok(())
}

/// Replace the dashboard's Template sheet with the pairs in `file`. Year sheets
/// are not touched; rows for new pairs are added by the next run.
pub fn import(file: &Path) -> Result<()> {
    let settings = load_settings();
    let dashboard = settings.dashboard_path();
    let mut workbook = Workbook::open(&dashboard)?;
    let before: HashSet<CategoryPair> = Taxonomy::from_workbook(&workbook, &settings.template_sheet)
        .map(|parsed| parsed.taxonomy.pairs().collect())
        .unwrap_or_default();

    let pairs = read_template_pairs(file, &settings.template_sheet)?;
    workbook.replace_template(&settings.template_sheet, &pairs)?;
    let parsed = Taxonomy::from_workbook(&workbook, &settings.template_sheet)?;
    workbook.save(&dashboard)?;

    for pair in pairs.iter().filter(|p| !before.contains(*p)) {
        println!("{}", format!("+ {pair}").green());
    }
    let after: HashSet<CategoryPair> = parsed.taxonomy.pairs().collect();
    let mut removed: Vec<&CategoryPair> = before.iter().filter(|p| !after.contains(*p)).collect();
    removed.sort();
    for pair in removed {
        println!("{}", format!("- {pair}").red());
    }
    for w in &parsed.warnings {
        println!("{} {w}", "Warning:".yellow());
    }

    println!(
        "Template updated: {} categories, {} subcategories",
        parsed.taxonomy.categories().len(),
        parsed.taxonomy.pair_count()
    );
    let years = workbook.year_sheets();
    if !years.is_empty() {
        let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
        println!("Year sheets kept: {}", years.join(", "));
    }

    if let Ok(store) = MappingStore::load(&settings.mapping_path()) {
        let conflicts = detect_conflicts(&parsed.taxonomy, &store);
        if !conflicts.is_empty() {
            println!(
                "{}",
                format!(
                    "{} mapping(s) point at removed categories; run `penny remap`.",
                    conflicts.len()
                )
                .yellow()
            );
        }
    }
    Ok(())
}
