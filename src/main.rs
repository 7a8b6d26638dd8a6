//! cmipdrs - inventory, deduplicate and rename legacy CMIP archives.
//!
//! Usage:
//!   cmipdrs scan --era 3          Scan an era's roots into a JSON inventory
//!   cmipdrs hash --era 3          Hash-only index of every file
//!   cmipdrs dedupe CMIP3_*.json   Pick one canonical copy per content hash
//!   cmipdrs drs CMIP3_*.json      Plan the move into the DRS layout
//!   cmipdrs query CMIP3_*.json    Summary figures for an inventory
//!   cmipdrs --help                Show help

use std::path::{Path, PathBuf};
use std::thread;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

use cmipdrs_analyze::{
    DeduplicationResolver, DrsResolver, DuplicateConfig, plan_migration, summarize,
};
use cmipdrs_core::{AppConfig, ArchiveError, Era, Inventory, write_json};
use cmipdrs_scan::{ArchiveScanner, Checkpointer, HashIndexer, ScanProgress, load_inventories};
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Parser)]
#[command(
    name = "cmipdrs",
    version,
    about = "Inventory, deduplicate and rename CMIP archive trees",
    long_about = "cmipdrs walks a legacy CMIP archive, fingerprints every data file and \
                  recovers its creation date from metadata, then uses the resulting \
                  inventory to resolve duplicate copies and derive CMIP6 DRS paths."
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file with per-era settings and overrides
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan an era's archive roots into a JSON inventory
    Scan {
        /// Archive era (3, 5, 6 or CMIP3, ...)
        #[arg(short, long, value_parser = parse_era)]
        era: Era,

        /// Directory receiving the inventory shards
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Worker threads per directory (1 = sequential, 0 = all cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Record the SHA-256 of every file, without reading metadata
    Hash {
        #[arg(short, long, value_parser = parse_era)]
        era: Era,

        /// Output file (defaults to <ERA>_sha256.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve duplicate copies across inventories
    Dedupe {
        /// Inventory files, merged in order
        #[arg(required = true)]
        inventories: Vec<PathBuf>,

        /// Ignore directories containing this substring (repeatable)
        #[arg(short = 'x', long)]
        exclude: Vec<String>,

        /// Write the full report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Plan the migration of canonical copies into the DRS layout
    Drs {
        #[arg(required = true)]
        inventories: Vec<PathBuf>,

        /// Write the plan to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show summary figures for inventories
    Query {
        #[arg(required = true)]
        inventories: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let app_config = match &cli.config {
        Some(path) => AppConfig::load(path).wrap_err("Failed to load configuration")?,
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Scan {
            era,
            output_dir,
            threads,
        } => run_scan(&app_config, era, &output_dir, threads),
        Command::Hash { era, output } => run_hash(&app_config, era, output),
        Command::Dedupe {
            inventories,
            exclude,
            output,
        } => run_dedupe(&inventories, exclude, output),
        Command::Drs {
            inventories,
            output,
        } => run_drs(&app_config, &inventories, output),
        Command::Query { inventories } => run_query(&inventories),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_era(s: &str) -> Result<Era, ArchiveError> {
    s.parse().map_err(|_| ArchiveError::UnknownEra {
        name: s.to_string(),
    })
}

/// Scan an era and write its inventory.
fn run_scan(
    app_config: &AppConfig,
    era: Era,
    output_dir: &Path,
    threads: Option<usize>,
) -> Result<()> {
    let mut config = app_config.scan_config(era)?;
    if let Some(threads) = threads {
        config.threads = threads;
    }

    let mut checkpointer =
        Checkpointer::new(output_dir, era, config.checkpoint_every, config.shard_every);
    let scanner = ArchiveScanner::new(config);
    let progress = spawn_progress_logger(scanner.subscribe());

    let result = scanner.scan_with_checkpoints(&mut checkpointer);
    drop(scanner);
    let last = progress.join().ok().flatten();
    let inventory = result.wrap_err("Scan failed")?;

    println!();
    println!("{}", "─".repeat(70));
    println!(" {era} inventory");
    println!("{}", "─".repeat(70));
    println!(
        " {} files, {} dated, {} with a CMOR version",
        inventory.file_count(),
        inventory.dated_count(),
        inventory.tool_version_count()
    );
    println!(
        " {} malformed, {} unreadable, {} without a date",
        inventory.malformed().len(),
        inventory.read_errors().len(),
        inventory.no_date().len()
    );
    if let Some(last) = last {
        println!(
            " {} hashed in {:.1}s ({:.0} files/s, {}/s)",
            format_size(last.bytes_scanned),
            last.elapsed.as_secs_f64(),
            last.files_per_second(),
            format_size(last.bytes_per_second() as u64)
        );
    }
    for path in checkpointer.written() {
        println!("   {}", path.display());
    }
    Ok(())
}

/// Log scan progress on a background thread until the scanner is dropped.
fn spawn_progress_logger(
    mut rx: broadcast::Receiver<ScanProgress>,
) -> thread::JoinHandle<Option<ScanProgress>> {
    thread::spawn(move || {
        let mut last = None;
        loop {
            match rx.blocking_recv() {
                Ok(progress) => {
                    tracing::info!(
                        files = progress.files_scanned,
                        dirs = progress.dirs_scanned,
                        errors = progress.read_errors,
                        directory = %progress.current_path.display(),
                        "progress"
                    );
                    last = Some(progress);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "progress updates dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        last
    })
}

/// Build the hash-only index of an era.
fn run_hash(app_config: &AppConfig, era: Era, output: Option<PathBuf>) -> Result<()> {
    let config = app_config.scan_config(era)?;
    let output = output.unwrap_or_else(|| PathBuf::from(format!("{era}_sha256.json")));

    let index = HashIndexer::new(config)
        .index_to(&output)
        .wrap_err("Hash index failed")?;

    let duplicated = index.duplicates().count();
    println!(
        " {} files, {} digests with more than one path",
        index.file_count(),
        duplicated
    );
    println!(" Written to {}", output.display());
    Ok(())
}

fn load(paths: &[PathBuf]) -> Result<Inventory> {
    let inventory = load_inventories(paths).wrap_err("Failed to load inventories")?;
    tracing::info!(
        inventories = paths.len(),
        directories = inventory.directories().len(),
        files = inventory.file_count(),
        "inventories loaded"
    );
    Ok(inventory)
}

/// Resolve duplicate copies.
fn run_dedupe(paths: &[PathBuf], exclude: Vec<String>, output: Option<PathBuf>) -> Result<()> {
    let inventory = load(paths)?;
    let config = DuplicateConfig::builder()
        .exclude_patterns(exclude)
        .build()
        .wrap_err("Invalid deduplication settings")?;
    let report = DeduplicationResolver::with_config(config).resolve(&inventory);

    println!();
    println!("{}", "─".repeat(70));
    println!(" Duplicate File Report");
    println!("{}", "─".repeat(70));
    println!();
    println!(
        " {} files, {} unique, {} empty directories",
        report.files_analyzed,
        report.unique_count(),
        report.empty_directories.len()
    );

    if report.has_duplicates() {
        println!(
            " {} duplicate groups, {} wasted",
            report.groups.len(),
            format_size(report.total_wasted_space)
        );
        if output.is_none() {
            println!();
            for group in &report.groups {
                println!(
                    " {} ({} copies, {} each)",
                    group.hash,
                    group.count(),
                    format_size(group.size)
                );
                for member in &group.members {
                    let marker = if *member == group.canonical { "*" } else { " " };
                    println!("  {marker} {}/{}", member.directory, member.file_name);
                }
            }
        }
    } else {
        println!(" No duplicate files found.");
    }

    if let Some(path) = output {
        write_json(&path, &report)?;
        eprintln!("Report written to {}", path.display());
    }
    Ok(())
}

/// Plan the migration into DRS paths.
fn run_drs(app_config: &AppConfig, paths: &[PathBuf], output: Option<PathBuf>) -> Result<()> {
    let inventory = load(paths)?;
    let report = DeduplicationResolver::new().resolve(&inventory);
    let resolver = DrsResolver::new(app_config.drs.clone());
    let plan = plan_migration(&inventory, &report, &resolver);

    match output {
        Some(path) => {
            write_json(&path, &plan)?;
            eprintln!("Plan written to {}", path.display());
        }
        None => {
            for step in &plan.moves {
                println!("{} -> {}", step.source, step.destination.display());
            }
        }
    }

    if !plan.failures.is_empty() {
        eprintln!();
        eprintln!("{} unresolved:", plan.failures.len());
        for failure in &plan.failures {
            match &failure.file_name {
                Some(name) => eprintln!("  {}/{}: {}", failure.directory, name, failure.reason),
                None => eprintln!("  {}: {}", failure.directory, failure.reason),
            }
        }
    }
    eprintln!(
        "{} moves, {} failures, {} skipped directories",
        plan.moves.len(),
        plan.failures.len(),
        plan.skipped_directories.len()
    );
    Ok(())
}

/// Print summary figures.
fn run_query(paths: &[PathBuf]) -> Result<()> {
    let summary = summarize(&load(paths)?);

    println!();
    println!("{}", "─".repeat(70));
    println!(
        " {} directories ({} empty), {} files, {}",
        summary.directories,
        summary.empty_directories,
        summary.files,
        format_size(summary.total_bytes)
    );
    println!(" {} files carry a metadata date", summary.dated_files);
    println!("{}", "─".repeat(70));

    if let Some(earliest) = &summary.earliest {
        println!(" Earliest: {} {}", earliest.date, earliest.directory);
    }
    if let Some(latest) = &summary.latest {
        println!(" Latest:   {} {}", latest.date, latest.directory);
    }
    for (label, value) in [
        ("Longest directory", &summary.longest_directory),
        ("Longest file name", &summary.longest_file_name),
        ("Longest path", &summary.longest_path),
    ] {
        if let Some(value) = value {
            println!(" {label}: {value} ({})", value.len());
        }
    }
    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
