// roster sites - registry inspection and loading

use std::path::PathBuf;

use clap::Subcommand;

use roster_ingest::IngestConfig;
use roster_io::SqliteStore;

use crate::{open_registry, print_json, util, CliError, RegistryArgs};

#[derive(Subcommand)]
pub enum SitesCommands {
    /// Print the sites the resolver would consider for a municipality
    List {
        /// Municipality (default: first entry of `municipalities` in config)
        #[arg(long, short = 'm')]
        municipality: Option<String>,

        #[command(flatten)]
        registry: RegistryArgs,

        #[arg(long)]
        json: bool,
    },

    /// Load a CSV site list into the `sites` table of a database
    Import {
        /// CSV file (full_name,generic_name,municipality,industrialized,code)
        csv: PathBuf,

        /// Target database (created if missing)
        #[arg(long)]
        db: PathBuf,
    },
}

pub fn run(config: &IngestConfig, command: SitesCommands) -> Result<(), CliError> {
    match command {
        SitesCommands::List { municipality, registry, json } => {
            let municipality =
                municipality.unwrap_or_else(|| config.fallback_municipality().to_string());
            cmd_list(&municipality, &registry, json)
        }
        SitesCommands::Import { csv, db } => cmd_import(&csv, &db),
    }
}

fn cmd_list(municipality: &str, registry_args: &RegistryArgs, json: bool) -> Result<(), CliError> {
    let registry = open_registry(registry_args, None)?;
    let sites = registry
        .sites_for_municipality(municipality)
        .map_err(|e| CliError::store(e.to_string()))?;

    if json {
        return print_json(&sites);
    }

    if sites.is_empty() {
        println!("no sites registered for {}", municipality);
        return Ok(());
    }
    let columns = ["code", "full name", "generic name", "industrialized"].map(String::from);
    let rows: Vec<Vec<String>> = sites
        .iter()
        .map(|s| {
            vec![
                s.code.clone(),
                s.full_name.clone(),
                s.generic_name.clone().unwrap_or_default(),
                if s.industrialized { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print!("{}", util::format_table(&columns, &rows));
    println!("{} sites in {}", sites.len(), municipality);
    Ok(())
}

fn cmd_import(csv: &std::path::Path, db: &std::path::Path) -> Result<(), CliError> {
    let sites = roster_io::csv::import_sites(csv).map_err(CliError::args)?;
    let mut store = SqliteStore::open(db)
        .map_err(|e| CliError::store(format!("cannot open {}: {}", db.display(), e)))?;
    let loaded = store.load_sites(&sites).map_err(CliError::store)?;
    println!("loaded {} sites into {}", loaded, db.display());
    Ok(())
}
