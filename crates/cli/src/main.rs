// roster CLI - headless school-enrollment roster ingestion

mod exit_codes;
mod logging;
mod settings;
mod sites;
mod util;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use roster_ingest::model::IngestionResult;
use roster_ingest::validate::media_type_for_extension;
use roster_ingest::{
    CleanedRow, IngestConfig, IngestionOrchestrator, SiteRegistry, SourceFormat, StaticRegistry,
    UploadedFile,
};
use roster_io::{SqliteSiteRegistry, SqliteStore};

use exit_codes::{
    exit_code_for, EXIT_ERROR, EXIT_PARTIAL_PERSIST, EXIT_STORE, EXIT_SUCCESS,
    EXIT_UNMATCHED_SITES, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "roster")]
#[command(about = "Validate, resolve and load school-enrollment rosters")]
#[command(version)]
#[command(after_help = "\
Config (TOML, every key optional):
  year, etc_code, municipalities, match_threshold, chunk_size,
  max_file_bytes, preview_rows, [new_format], [original_format]

Looked up in order: --config, $ROSTER_CONFIG, <config dir>/roster/roster.toml")]
struct Cli {
    /// Config file
    #[arg(long, global = true, env = "ROSTER_CONFIG")]
    config: Option<PathBuf>,

    /// More logging on stderr (-v info, -vv debug). RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    /// Program roster with a discriminator column
    New,
    /// SIMAT-style enrollment export
    Original,
}

impl From<FormatArg> for SourceFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::New => SourceFormat::New,
            FormatArg::Original => SourceFormat::Original,
        }
    }
}

/// Where canonical sites come from.
#[derive(clap::Args, Clone, Debug)]
struct RegistryArgs {
    /// SQLite database with a `sites` table
    #[arg(long, conflicts_with = "sites")]
    registry: Option<PathBuf>,

    /// CSV site list (full_name,generic_name,municipality,industrialized,code)
    #[arg(long)]
    sites: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and persist resolved rows
    #[command(after_help = "\
Examples:
  roster ingest roster.xlsx --format new --focalization F1 --db enrollments.db --sites sites.csv
  roster ingest simat.xlsx --format original --focalization F2 --db enrollments.db --json")]
    Ingest {
        /// Uploaded spreadsheet (.xlsx or .xls)
        file: PathBuf,

        /// Source layout
        #[arg(long, short = 'f', value_enum)]
        format: FormatArg,

        /// Program allocation tag stamped on every row
        #[arg(long)]
        focalization: String,

        /// Enrollment database (created if missing). Also the site registry
        /// when neither --registry nor --sites is given
        #[arg(long)]
        db: Option<PathBuf>,

        #[command(flatten)]
        registry: RegistryArgs,

        /// Resolve and report, but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Exit 8 when any site name stays unmatched
        #[arg(long)]
        fail_on_unmatched: bool,

        /// Print the result as one JSON object
        #[arg(long)]
        json: bool,
    },

    /// Check the file type, structure and row filters only
    Validate {
        file: PathBuf,

        #[arg(long, short = 'f', value_enum)]
        format: FormatArg,

        #[arg(long)]
        json: bool,
    },

    /// Resolve without persisting and show the first rows
    Preview {
        file: PathBuf,

        #[arg(long, short = 'f', value_enum)]
        format: FormatArg,

        #[arg(long, default_value = "PREVIEW")]
        focalization: String,

        #[command(flatten)]
        registry: RegistryArgs,

        /// Rows to show (default: preview_rows from config)
        #[arg(long)]
        rows: Option<usize>,

        /// Write every resolved row and the site statistics to an .xlsx file
        #[arg(long)]
        export: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Inspect or load the site registry
    #[command(subcommand)]
    Sites(sites::SitesCommands),
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self { code: EXIT_STORE, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Exit code only; the details were already printed (e.g. as JSON).
    pub fn silent(code: u8) -> Self {
        Self { code, message: String::new(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let result = settings::load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Ingest {
            file,
            format,
            focalization,
            db,
            registry,
            dry_run,
            fail_on_unmatched,
            json,
        } => cmd_ingest(
            &config,
            &file,
            format.into(),
            &focalization,
            db.as_deref(),
            &registry,
            dry_run,
            fail_on_unmatched,
            json,
        ),
        Commands::Validate { file, format, json } => {
            cmd_validate(&config, &file, format.into(), json)
        }
        Commands::Preview { file, format, focalization, registry, rows, export, json } => {
            cmd_preview(
                &config,
                &file,
                format.into(),
                &focalization,
                &registry,
                rows,
                export.as_deref(),
                json,
            )
        }
        Commands::Sites(command) => sites::run(&config, command),
    });

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Read an upload from disk, declaring the media type its extension implies.
fn read_upload(path: &Path) -> Result<UploadedFile, CliError> {
    let bytes = std::fs::read(path)
        .map_err(|e| CliError::args(format!("cannot read {}: {}", path.display(), e)))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let media_type = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(media_type_for_extension)
        .unwrap_or("application/octet-stream");
    Ok(UploadedFile::new(file_name, media_type, bytes))
}

/// Open the site registry named by the flags, falling back to `db`.
pub(crate) fn open_registry(
    args: &RegistryArgs,
    db: Option<&Path>,
) -> Result<Box<dyn SiteRegistry>, CliError> {
    if let Some(csv_path) = &args.sites {
        let sites = roster_io::csv::import_sites(csv_path).map_err(CliError::args)?;
        tracing::info!(count = sites.len(), path = %csv_path.display(), "loaded site list");
        return Ok(Box::new(StaticRegistry::new(sites)));
    }
    match args.registry.as_deref().or(db) {
        Some(path) => {
            let registry = SqliteSiteRegistry::open(path).map_err(CliError::store)?;
            Ok(Box::new(registry))
        }
        None => Err(CliError::args("no site registry given")
            .with_hint("pass --registry <db>, --sites <csv> or --db <db>")),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::general(format!("cannot serialize result: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Turn a finished result into the process outcome. With `--json` the
/// result is already on stdout, so only the exit code is carried.
fn finish(result: &IngestionResult, json: bool, fail_on_unmatched: bool) -> Result<(), CliError> {
    if !result.success {
        let code = result.error_kind.map(exit_code_for).unwrap_or(EXIT_ERROR);
        if json {
            return Err(CliError::silent(code));
        }
        let mut err = CliError { code, message: result.message.clone(), hint: None };
        if !result.missing_columns.is_empty() {
            err = err.with_hint(format!("missing: {}", result.missing_columns.join(", ")));
        }
        return Err(err);
    }

    let partial = result
        .persistence
        .as_ref()
        .map(|p| !p.is_complete())
        .unwrap_or(false);
    let code = if partial {
        EXIT_PARTIAL_PERSIST
    } else if fail_on_unmatched && !result.unmatched_sites.is_empty() {
        EXIT_UNMATCHED_SITES
    } else {
        return Ok(());
    };

    if json {
        Err(CliError::silent(code))
    } else if partial {
        Err(CliError { code, message: "some chunks were not written".into(), hint: None }
            .with_hint("re-run the same file; rows already stored are skipped"))
    } else {
        Err(CliError {
            code,
            message: format!("{} site names did not resolve", result.unmatched_sites.len()),
            hint: None,
        })
    }
}

fn print_summary(result: &IngestionResult) {
    println!("{}", result.message);
    println!(
        "rows: {} read, {} valid, {} resolved",
        result.total_rows, result.valid_rows, result.resolved_rows
    );
    if let Some(outcome) = &result.persistence {
        println!(
            "persisted: {} inserted, {} already present, {} of {} chunks committed",
            outcome.inserted,
            outcome.ignored_conflicts,
            outcome.chunks_committed,
            outcome.chunks_committed + outcome.chunk_failures.len()
        );
    }
    println!(
        "sites: {} exact, {} fuzzy, {} by generic name, {} unmatched",
        result.exact_matches,
        result.fuzzy_full_matches.len(),
        result.fuzzy_generic_matches.len(),
        result.unmatched_sites.len()
    );

    let fuzzy: Vec<Vec<String>> = result
        .fuzzy_full_matches
        .iter()
        .chain(&result.fuzzy_generic_matches)
        .map(|m| vec![m.raw_name.clone(), m.resolved_name.clone(), m.score.to_string()])
        .collect();
    if !fuzzy.is_empty() {
        println!();
        let columns = ["source name", "resolved to", "score"].map(String::from);
        print!("{}", util::format_table(&columns, &fuzzy));
    }

    if !result.unmatched_sites.is_empty() {
        println!("\nunmatched:");
        for name in &result.unmatched_sites {
            println!("  {}", name);
        }
    }

    if !result.statistics.is_empty() {
        println!();
        let mut columns = vec!["site".to_string(), "total".to_string()];
        columns.extend(
            roster_ingest::model::EducationLevel::ALL.iter().map(|l| l.label().to_string()),
        );
        let rows: Vec<Vec<String>> = result
            .statistics
            .iter()
            .map(|s| {
                let mut row = vec![s.site.clone(), s.total.to_string()];
                row.extend(s.by_level.values().map(|n| n.to_string()));
                row
            })
            .collect();
        print!("{}", util::format_table(&columns, &rows));
    }

    for error in &result.errors {
        eprintln!("row error: {}", error);
    }
    for warning in &result.warnings {
        eprintln!("warning: {}", warning);
    }
}

// ============================================================================
// ingest
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn cmd_ingest(
    config: &IngestConfig,
    path: &Path,
    format: SourceFormat,
    focalization: &str,
    db: Option<&Path>,
    registry_args: &RegistryArgs,
    dry_run: bool,
    fail_on_unmatched: bool,
    json: bool,
) -> Result<(), CliError> {
    let file = read_upload(path)?;
    let registry = open_registry(registry_args, db)?;

    let mut store = match (db, dry_run) {
        (Some(db), false) => Some(
            SqliteStore::open(db)
                .map_err(|e| CliError::store(format!("cannot open {}: {}", db.display(), e)))?,
        ),
        (None, false) => {
            return Err(CliError::args("--db is required unless --dry-run is given"));
        }
        (_, true) => None,
    };

    let mut orchestrator = IngestionOrchestrator::new(config, registry.as_ref());
    if let Some(store) = store.as_mut() {
        orchestrator = orchestrator.with_store(store);
    }
    let result = orchestrator.run(&file, format, focalization, !dry_run);

    if json {
        print_json(&result)?;
    } else if result.success {
        print_summary(&result);
    }
    finish(&result, json, fail_on_unmatched)
}

// ============================================================================
// validate
// ============================================================================

fn cmd_validate(
    config: &IngestConfig,
    path: &Path,
    format: SourceFormat,
    json: bool,
) -> Result<(), CliError> {
    let file = read_upload(path)?;
    // Validation never consults the registry
    let registry = StaticRegistry::new(Vec::new());
    let result = IngestionOrchestrator::new(config, &registry).validate_only(&file, format);

    if json {
        print_json(&result)?;
    } else if result.success {
        println!("{}", result.message);
    }
    finish(&result, json, false)
}

// ============================================================================
// preview
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn cmd_preview(
    config: &IngestConfig,
    path: &Path,
    format: SourceFormat,
    focalization: &str,
    registry_args: &RegistryArgs,
    rows: Option<usize>,
    export: Option<&Path>,
    json: bool,
) -> Result<(), CliError> {
    let mut config = config.clone();
    if let Some(n) = rows {
        config.preview_rows = n;
    }

    let file = read_upload(path)?;
    let registry = open_registry(registry_args, None)?;
    let (result, resolved): (IngestionResult, Vec<CleanedRow>) =
        IngestionOrchestrator::new(&config, registry.as_ref())
            .run_with_rows(&file, format, focalization, false);

    if result.success {
        if let Some(out) = export {
            roster_io::xlsx::export(&resolved, &result.statistics, out).map_err(CliError::general)?;
        }
    }

    if json {
        print_json(&result)?;
    } else if result.success {
        println!("{}", result.message);
        let preview = &result.preview;
        if !preview.rows.is_empty() {
            println!();
            print!("{}", util::format_table(&preview.columns, &preview.rows));
            if preview.is_truncated() {
                println!("... {} more rows", preview.total_rows - preview.rows.len());
            }
        }
        if let Some(out) = export {
            println!("exported {} rows to {}", resolved.len(), out.display());
        }
        for warning in &result.warnings {
            eprintln!("warning: {}", warning);
        }
    }
    finish(&result, json, false)
}
