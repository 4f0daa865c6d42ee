use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::atomic::backup_file;
use crate::error::{PennyError, Result};
use crate::importer::read_template_pairs;
use crate::settings::{load_settings, save_settings, shellexpand_path};
use crate::taxonomy::Taxonomy;
use crate::workbook::Workbook;

/// A dashboard seeded from `path`: a Category,Subcategory CSV, or an existing
/// workbook taken as-is with its formatting.
fn template_workbook(path: &Path, sheet: &str) -> Result<Workbook> {
    if !path.exists() {
        return Err(PennyError::Input(format!("{} not found", path.display())));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext == "csv" {
        let pairs = read_template_pairs(path, sheet)?;
        return Workbook::with_template(sheet, &pairs);
    }
    Workbook::read(path)
}

pub fn run(data_dir: Option<String>, template: Option<PathBuf>, force: bool) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    save_settings(&settings)?;

    let resolved = settings.data_path();
    std::fs::create_dir_all(&resolved)?;

    let dashboard = settings.dashboard_path();
    if dashboard.exists() {
        if !force {
            if template.is_some() {
                return Err(PennyError::Other(format!(
                    "dashboard already exists at {}; use `penny template FILE` to change its Template \
                     (year sheets are kept), or pass --force to start a new dashboard",
                    dashboard.display()
                )));
            }
            println!("Dashboard already exists at {}", dashboard.display());
            println!("Initialized penny at {}", resolved.display());
            return Ok(());
        }
        let backup = backup_file(&dashboard)?;
        println!("Previous dashboard copied to {}", backup.display());
    }

    let workbook = match &template {
        Some(path) => {
            let workbook = template_workbook(path, &settings.template_sheet)?;
            let parsed = Taxonomy::from_workbook(&workbook, &settings.template_sheet)?;
            for w in &parsed.warnings {
                println!("{} {w}", "Warning:".yellow());
            }
            println!(
                "Template: {} categories, {} subcategories",
                parsed.taxonomy.categories().len(),
                parsed.taxonomy.pair_count()
            );
            workbook
        }
        None => Workbook::blank(&settings.template_sheet)?,
    };
    workbook.save(&dashboard)?;

    println!("Initialized penny at {}", resolved.display());
    if template.is_none() {
        println!(
            "Fill in the '{}' sheet of {} (or use `penny template FILE`) before `penny run`.",
            settings.template_sheet,
            dashboard.display()
        );
    }
    Ok(())
}
