use crate::conflicts::detect_conflicts;
use crate::error::Result;
use crate::mapping::MappingStore;
use crate::settings::load_settings;
use crate::taxonomy::Taxonomy;
use crate::workbook::Workbook;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let dashboard = settings.dashboard_path();
    let mapping = settings.mapping_path();

    println!("Data dir:   {}", settings.data_path().display());
    println!("Dashboard:  {}", dashboard.display());
    println!("Mappings:   {}", mapping.display());
    println!("On existing cells: {:?}", settings.on_existing);

    if !dashboard.exists() {
        println!();
        println!("Dashboard not found. Run `penny init` to set up.");
        return Ok(());
    }

    let workbook = Workbook::open(&dashboard)?;
    let years: Vec<String> = workbook.year_sheets().iter().map(|y| y.to_string()).collect();
    println!();
    println!(
        "Year sheets:   {}",
        if years.is_empty() { "(none)".to_string() } else { years.join(", ") }
    );

    let store = MappingStore::load(&mapping);
    match &store {
        Ok(s) => println!("Mappings:      {}", s.len()),
        Err(e) => println!("Mappings:      {e}"),
    }

    match Taxonomy::from_workbook(&workbook, &settings.template_sheet) {
        Ok(parsed) => {
            let taxonomy = parsed.taxonomy;
            println!(
                "Template:      {} categories, {} subcategories, {} warning(s)",
                taxonomy.categories().len(),
                taxonomy.pair_count(),
                parsed.warnings.len()
            );
            if let Ok(s) = &store {
                println!("Conflicts:     {}", detect_conflicts(&taxonomy, s).len());
            }
        }
        Err(e) => println!("Template:      {e}"),
    }
    Ok(())
}
