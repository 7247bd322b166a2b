//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - initialises logging
//! - runs the HTTP service or one of the offline commands

use std::path::Path;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, CompareArgs, EstimateArgs, GenerateArgs, ServeArgs};
use crate::config::Config;
use crate::error::AppError;
use crate::estimate::estimate_all;
use crate::io::{estimates_csv, read_actual_yields, read_daily_dataset, read_submission, write_file};
use crate::report::{ReportDetails, format_comparison, format_estimates};

pub mod pipeline;

/// Entry point for the `icar` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Serve(args) => handle_serve(args),
        Command::Estimate(args) => handle_estimate(args),
        Command::Generate(args) => handle_generate(args),
        Command::Compare(args) => handle_compare(args),
    }
}

/// Logs go to stderr so command output on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_serve(args: ServeArgs) -> Result<(), AppError> {
    let mut config = Config::load()?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::storage(format!("Failed to start async runtime: {e}")))?;
    runtime.block_on(crate::server::start_server(config))
}

fn handle_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let dataset = read_daily_dataset(&read_input(&args.input)?)?;
    for note in &dataset.notes {
        warn!(line = note.line, id = ?note.id, "{}", note.message);
    }

    let run = estimate_all(&dataset.records())?;
    println!("{}", format_estimates(&run));

    if let Some(path) = &args.output {
        write_file(path, &estimates_csv(&run.estimates)?)?;
        info!(path = %path.display(), rows = run.estimates.len(), "Wrote estimates");
    }
    Ok(())
}

fn handle_generate(args: GenerateArgs) -> Result<(), AppError> {
    let dataset = read_daily_dataset(&read_input(&args.input)?)?;
    let set = pipeline::build_test_set(&dataset, args.size, args.seed)?;
    write_file(&args.output, &set.csv)?;

    println!(
        "Wrote {} lactations ({} rows) to {} | estimated={} skipped={}",
        set.selected.len(),
        set.subset.rows.len(),
        args.output.display(),
        set.run.estimates.len(),
        set.run.skipped.len()
    );
    Ok(())
}

fn handle_compare(args: CompareArgs) -> Result<(), AppError> {
    let dataset = read_daily_dataset(&read_input(&args.dataset)?)?;
    let submitted = read_submission(&read_input(&args.submission)?)?;
    let actual = match &args.actual {
        Some(path) => Some(read_actual_yields(&read_input(path)?)?),
        None => None,
    };

    let report = pipeline::compare_dataset(&dataset, submitted, actual)?;

    let details = ReportDetails {
        submission_id: args.submission.display().to_string(),
        dataset_link: args.dataset.display().to_string(),
        ..ReportDetails::default()
    };
    println!("{}", format_comparison(&details, &report));
    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>, AppError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::not_found(format!("Input file '{}' not found.", path.display())),
        _ => AppError::storage(format!("Failed to read '{}': {e}", path.display())),
    })
}
