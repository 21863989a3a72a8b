use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use pass_catalog::config::Config;
use pass_catalog::logging::init_logging;
use pass_catalog::state::query::{ImageQuery, MapFilter, SortOrder};
use pass_catalog::{CompositeCatalog, Library, SyncEngine, SyncMode, SyncReport, UpdateGate};

#[derive(Parser, Debug)]
#[command(name = "pass-catalog", version, about = "Satellite pass image catalog")]
struct Cli {
    /// Config file (TOML). Defaults to ./pass-catalog.toml when present
    #[arg(short, long, global = true, env = "PASS_CATALOG_CONFIG")]
    config: Option<PathBuf>,

    /// Override the ingestion root
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Override the catalog database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add stable passes that are not cataloged yet
    Update,
    /// Clear the catalog and ingest every pass directory
    Repopulate,
    /// Delete the catalog file and ingest everything from scratch
    Rebuild,
    /// Run update periodically until interrupted
    Watch,
    /// List cataloged images as JSON
    Query {
        /// Satellite name (case-insensitive)
        #[arg(long)]
        satellite: Option<String>,

        /// Composite key, may be repeated (see `composites`)
        #[arg(long = "composite")]
        composites: Vec<String>,

        /// Map overlay filter: any, only, none
        #[arg(long, default_value = "any")]
        map: MapFilter,

        /// Case-insensitive path substring
        #[arg(long)]
        search: Option<String>,

        /// newest, oldest, asc or desc
        #[arg(long)]
        sort: Option<SortOrder>,
    },
    /// List satellites that have images
    Satellites,
    /// Print the composite key/label table as JSON
    Composites,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.ingest_root = root;
    }
    if let Some(database) = cli.database {
        config.database = Some(database);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    let _logger = init_logging(&config.logging.level, config.logging.directory.as_deref())?;

    match cli.command {
        Command::Update => sync_once(&config, SyncMode::Update).await,
        Command::Repopulate => sync_once(&config, SyncMode::Repopulate).await,
        Command::Rebuild => sync_once(&config, SyncMode::Rebuild).await,
        Command::Watch => watch(&config).await,
        Command::Query {
            satellite,
            composites,
            map,
            search,
            sort,
        } => {
            let query = ImageQuery {
                satellite,
                composites,
                map,
                search,
                sort,
            };
            let library = open_library(&config)?;
            let images = library.query_images(&query, &CompositeCatalog::builtin())?;
            println!("{}", serde_json::to_string_pretty(&images)?);
            Ok(())
        }
        Command::Satellites => {
            let library = open_library(&config)?;
            println!("{}", serde_json::to_string_pretty(&library.satellites()?)?);
            Ok(())
        }
        Command::Composites => {
            let entries = CompositeCatalog::builtin().entries();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
    }
}

fn open_library(config: &Config) -> anyhow::Result<Library> {
    let path = config.database_path()?;
    let library = Library::open(&path)
        .with_context(|| format!("Failed to open catalog at {}", path.display()))?;
    Ok(library)
}

fn open_engine(config: &Config) -> anyhow::Result<SyncEngine> {
    let library = open_library(config)?;
    info!("Catalog: {}", library.path().map(|p| p.display().to_string()).unwrap_or_default());
    info!("Ingestion root: {}", config.ingest_root.display());
    Ok(SyncEngine::new(&config.ingest_root, library).with_stability(config.stability_policy()))
}

/// Run a sync on a blocking worker; the engine is handed back with the result
async fn run_blocking(
    mut engine: SyncEngine,
    mode: SyncMode,
) -> anyhow::Result<(SyncEngine, pass_catalog::Result<SyncReport>)> {
    let joined = tokio::task::spawn_blocking(move || {
        let result = engine.run(mode);
        (engine, result)
    })
    .await
    .context("Sync task panicked")?;
    Ok(joined)
}

async fn sync_once(config: &Config, mode: SyncMode) -> anyhow::Result<()> {
    let engine = open_engine(config)?;
    let (_, result) = run_blocking(engine, mode).await?;
    let report = result.with_context(|| format!("{} failed", mode))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!("✅ {}: added {} passes", report.mode, report.added);
    if report.skipped_unstable > 0 {
        println!("⏳ {} passes still being written", report.skipped_unstable);
    }
    for failure in &report.failed {
        println!("⚠️  {}: {}", failure.name, failure.error);
    }
}

async fn watch(config: &Config) -> anyhow::Result<()> {
    let mut engine = open_engine(config)?;
    let mut gate = UpdateGate::new(config.update_cooldown());

    let mut interval = tokio::time::interval(config.watch_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Watching every {:?}", config.watch_interval());

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
        }

        let started = Instant::now();
        if let Err(cooldown) = gate.check(started) {
            debug!("{}", cooldown);
            continue;
        }

        let (returned, result) = run_blocking(engine, SyncMode::Update).await?;
        engine = returned;

        match result {
            Ok(report) => {
                gate.record_success(started);
                if report.added > 0 || !report.failed.is_empty() {
                    print_report(&report);
                }
            }
            Err(e) => error!("Update failed: {}", e),
        }
    }
}
