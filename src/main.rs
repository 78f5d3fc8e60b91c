use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use dex_normalizer::config::{DEFAULT_DATABASE_PATH, DEFAULT_SOURCE_PATH};
use dex_normalizer::{
    get_entity_view, get_load_runs, run_load, table_counts, LoadConfig, RowErrorPolicy, Store,
};

#[derive(Parser)]
#[command(name = "dex-normalizer")]
#[command(about = "Load a denormalized catalog CSV into a normalized SQLite store")]
#[command(version)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the load pipeline (safe to repeat)
    Import(ImportArgs),
    /// Print row counts for every catalog table
    Counts(StoreArgs),
    /// Print one entity joined back from the normalized tables
    Show(ShowArgs),
    /// List recorded load runs
    Runs(StoreArgs),
}

#[derive(Args)]
struct StoreArgs {
    /// SQLite database file
    #[arg(short, long, default_value = DEFAULT_DATABASE_PATH)]
    database: PathBuf,
}

#[derive(Args)]
struct ImportArgs {
    /// Catalog CSV to load
    #[arg(short, long, default_value = DEFAULT_SOURCE_PATH)]
    source: PathBuf,

    /// SQLite database file (created if missing)
    #[arg(short, long, default_value = DEFAULT_DATABASE_PATH)]
    database: PathBuf,

    /// Roll back and report rejected rows instead of aborting the load
    #[arg(long)]
    skip_rejected: bool,
}

#[derive(Args)]
struct ShowArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Entity key to look up
    entity_key: i64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")?;

    match cli.command {
        Commands::Import(args) => run_import(args),
        Commands::Counts(args) => run_counts(args),
        Commands::Show(args) => run_show(args),
        Commands::Runs(args) => run_runs(args),
    }
}

fn run_import(args: ImportArgs) -> Result<()> {
    println!("🗄️  Catalog import - CSV → normalized SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if let Some(parent) = args.database.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }

    let policy = if args.skip_rejected {
        RowErrorPolicy::Skip
    } else {
        RowErrorPolicy::Abort
    };
    let config = LoadConfig::new(&args.source, &args.database).with_row_error_policy(policy);
    info!(?config, "Import configured");

    let report = run_load(&config)
        .with_context(|| format!("Load of {} failed; nothing was committed", args.source.display()))?;

    println!("\n✓ Run {}", report.run_id);
    println!("✓ {}", report.summary());
    for rejected in &report.rejected {
        println!("  ✗ line {}: {}", rejected.line, rejected.error);
    }
    if !report.malformed_trait_lines.is_empty() {
        println!(
            "  ⚠ trait lists skipped on lines {:?}",
            report.malformed_trait_lines
        );
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if report.is_noop() {
        println!("✅ Store already up to date ({} ms)", report.elapsed_ms);
    } else {
        println!("✅ Import complete ({} ms)", report.elapsed_ms);
    }

    Ok(())
}

fn open_existing(path: &Path) -> Result<Store> {
    if !path.exists() {
        bail!(
            "Database not found at {}. Run `dex-normalizer import` first.",
            path.display()
        );
    }
    Store::open_read_only(path).with_context(|| format!("Failed to open {}", path.display()))
}

fn run_counts(args: StoreArgs) -> Result<()> {
    let store = open_existing(&args.database)?;
    let counts = table_counts(store.conn())?;
    for (table, n) in &counts.0 {
        println!("{:<22} {:>8}", table, n);
    }
    Ok(())
}

fn run_show(args: ShowArgs) -> Result<()> {
    let store = open_existing(&args.store.database)?;
    match get_entity_view(store.conn(), args.entity_key)? {
        Some(view) => println!("{}", serde_json::to_string_pretty(&view)?),
        None => bail!("No entity with key {}", args.entity_key),
    }
    Ok(())
}

fn run_runs(args: StoreArgs) -> Result<()> {
    let store = open_existing(&args.database)?;
    let runs = get_load_runs(store.conn())?;
    if runs.is_empty() {
        println!("No load runs recorded");
    }
    for run in runs {
        println!(
            "{}  {}  {}  sha256:{}",
            run.started_at.to_rfc3339(),
            run.run_id,
            run.source_path,
            &run.source_sha256[..12.min(run.source_sha256.len())],
        );
    }
    Ok(())
}
