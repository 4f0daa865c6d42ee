pub mod conflicts;
pub mod init;
pub mod mappings;
pub mod run;
pub mod status;
pub mod taxonomy;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::settings::ExistingCellPolicy;

#[derive(Parser)]
#[command(
    name = "penny",
    version,
    about = "Categorize bank statements into a per-year spending dashboard."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up penny: choose a data directory and create the dashboard.
    Init {
        /// Path for penny data (default: ~/Documents/penny)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Seed the Template from a workbook (.xlsx) or a Category,Subcategory CSV
        #[arg(long)]
        template: Option<PathBuf>,
        /// Start a new dashboard even if one exists (the old file is copied aside)
        #[arg(long)]
        force: bool,
    },
    /// Categorize statement files and write monthly totals to the dashboard.
    Run {
        /// CSV or XLSX statement files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Write without asking for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
        /// Never prompt; unknown merchants are skipped
        #[arg(long = "no-input")]
        no_input: bool,
        /// What to do with month cells that already hold a value
        #[arg(long = "on-existing", value_enum)]
        on_existing: Option<ExistingCellPolicy>,
    },
    /// Show the categories parsed from the Template sheet.
    Taxonomy,
    /// Replace the Template sheet from a CSV or workbook; year sheets are kept.
    Template {
        /// Category,Subcategory CSV, or a workbook with a Template sheet
        file: PathBuf,
    },
    /// List mappings that point at categories no longer in the Template.
    Conflicts,
    /// Remap every conflicting mapping interactively.
    Remap,
    /// Inspect or edit merchant mappings.
    Mappings {
        #[command(subcommand)]
        command: MappingsCommands,
    },
    /// Show paths, year sheets and mapping counts.
    Status,
}

#[derive(Subcommand)]
pub enum MappingsCommands {
    /// List all merchant mappings
    List,
    /// Map a merchant to a Template category
    Set {
        /// Merchant name as it appears in statements
        merchant: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        subcategory: String,
    },
}
