//! Ingest CLI - loads one enforcement spreadsheet into the database
//!
//! Reads a case-disposition, accusation or report sheet (.xlsx/.xls/.csv),
//! groups its rows and persists the aggregates. With --dry-run the file is
//! only read and grouped.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ingest::config::grouping_options_from_env;
use ingest::{ingest_path, IngestConfig, IngestOutcome, PgStore, SheetLayout, Store};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingest", about = "Loads enforcement spreadsheets into the database")]
struct Args {
    /// Spreadsheet to read (.xlsx, .xls or .csv)
    #[arg(long)]
    file: PathBuf,

    /// Sheet layout: case, accusation or report
    #[arg(long, default_value = "case")]
    layout: SheetLayout,

    /// Worksheet name, overriding the layout's default sheet
    #[arg(long)]
    sheet: Option<String>,

    /// Dry run - read and group only, don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Write grouped JSON to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_summary(outcome: &IngestOutcome) {
    println!("\nRun: {}", outcome.run_id);
    println!("Groups: {}", outcome.data.len());

    let Some(report) = &outcome.report else {
        return;
    };
    for (table, count) in &report.inserted {
        println!("  {:<26} {}", table.as_str(), count);
    }
    if report.failures.is_empty() {
        println!("All records persisted");
    } else {
        println!("{} record(s) failed:", report.failures.len());
        for failure in report.failures.iter().take(10) {
            println!("  - {}", failure);
        }
        if report.failures.len() > 10 {
            println!("  ... and {} more", report.failures.len() - 10);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    println!("=== Enforcement Sheet Ingest ===");
    println!("File: {}", args.file.display());
    println!("Layout: {}", args.layout.as_str());
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    let sheet = args.sheet.as_deref();
    let outcome = if args.dry_run {
        let options = grouping_options_from_env()?;
        ingest_path(&args.file, args.layout, sheet, None, options)
            .await
            .context("Failed to read spreadsheet")?
    } else {
        let config = IngestConfig::from_env()?;
        let store = PgStore::connect(&config)
            .await
            .context("Failed to connect to database")?;
        ingest_path(
            &args.file,
            args.layout,
            sheet,
            Some(&store as &dyn Store),
            config.grouping_options(),
        )
        .await
        .context("Failed to read spreadsheet")?
    };

    let json = serde_json::to_string_pretty(&outcome.data)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote grouped data to {}", path.display());
        }
        None if args.dry_run => println!("{}", json),
        None => {}
    }

    print_summary(&outcome);

    if !outcome.persisted {
        anyhow::bail!("{} record(s) failed to persist", outcome.failures().len());
    }
    Ok(())
}
