mod aggregator;
mod atomic;
mod categorizer;
mod cli;
mod conflicts;
mod error;
mod fmt;
mod importer;
mod mapping;
mod models;
mod normalizer;
mod pipeline;
mod prompt;
mod reconciler;
mod settings;
mod taxonomy;
mod workbook;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, MappingsCommands};

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_env("PENNY_LOG")
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&settings::load_settings().log_level);

    let result = match cli.command {
        Commands::Init {
            data_dir,
            template,
            force,
        } => cli::init::run(data_dir, template, force),
        Commands::Run {
            files,
            yes,
            no_input,
            on_existing,
        } => cli::run::run(files, yes, no_input, on_existing),
        Commands::Taxonomy => cli::taxonomy::run(),
        Commands::Template { file } => cli::taxonomy::import(&file),
        Commands::Conflicts => cli::conflicts::list(),
        Commands::Remap => cli::conflicts::remap(),
        Commands::Mappings { command } => match command {
            MappingsCommands::List => cli::mappings::list(),
            MappingsCommands::Set {
                merchant,
                category,
                subcategory,
            } => cli::mappings::set(&merchant, &category, &subcategory),
        },
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
