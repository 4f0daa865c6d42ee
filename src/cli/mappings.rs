use comfy_table::{Cell, Table};

use crate::conflicts::{detect_conflicts, ConflictSet};
use crate::error::{PennyError, Result};
use crate::mapping::MappingStore;
use crate::models::CategoryPair;
use crate::normalizer::normalize_merchant;
use crate::pipeline::load_dashboard;
use crate::settings::load_settings;

pub fn list() -> Result<()> {
    let settings = load_settings();
    let store = MappingStore::load(&settings.mapping_path())?;
    if store.is_empty() {
        println!("No mappings yet.");
        return Ok(());
    }
    // Flags are best-effort: without a readable Template every entry is shown plain.
    let conflicts = load_dashboard(&settings)
        .map(|(_, taxonomy, _)| detect_conflicts(&taxonomy, &store))
        .unwrap_or_else(|_| ConflictSet::default());

    let mut table = Table::new();
    table.set_header(vec!["Merchant", "Category", "Subcategory", ""]);
    for (merchant, pair) in store.entries() {
        let flag = if conflicts.is_flagged(merchant) { "conflict" } else { "" };
        table.add_row(vec![
            Cell::new(merchant),
            Cell::new(&pair.category),
            Cell::new(&pair.subcategory),
            Cell::new(flag),
        ]);
    }
    println!("Mappings ({}, {})\n{table}", store.len(), store.path().display());
    Ok(())
}

pub fn set(merchant: &str, category: &str, subcategory: &str) -> Result<()> {
    let settings = load_settings();
    let (_, taxonomy, _) = load_dashboard(&settings)?;
    let pair = CategoryPair::new(category.trim(), subcategory.trim());
    taxonomy.validate(&pair)?;

    let key = normalize_merchant(merchant);
    if key.is_empty() {
        return Err(PennyError::Input("merchant name is empty".to_string()));
    }
    let mut store = MappingStore::load(&settings.mapping_path())?;
    let previous = store.upsert(&key, pair.clone());
    store.save()?;

    match previous {
        Some(old) if old != pair => println!("Remapped '{key}': {old} \u{2192} {pair}"),
        _ => println!("Mapped '{key}' \u{2192} {pair}"),
    }
    Ok(())
}
