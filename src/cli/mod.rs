//! Command-line parsing for the `icar` binary.
//!
//! Argument parsing and command dispatch stay separate from the estimation
//! and comparison code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "icar", version, about = "ICAR 305-day milk yield test service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Estimate 305-day yields for every lactation in a test-day CSV.
    Estimate(EstimateArgs),
    /// Sample a test set from a test-day CSV (offline).
    Generate(GenerateArgs),
    /// Estimate reference yields from a dataset and compare a submission against them.
    Compare(CompareArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ServeArgs {
    /// Listen port (overrides PORT).
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Debug, Args, Clone)]
pub struct EstimateArgs {
    /// Test-day CSV (`TestId`, `DaysInMilk`, `DailyMilkingYield`, optional `Parity`).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Write `TestId,Total305Yield` to this CSV.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    #[arg(short, long)]
    pub input: PathBuf,

    /// Lactations to sample.
    #[arg(short = 'n', long, default_value_t = 300)]
    pub size: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Where to write the sampled subset.
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct CompareArgs {
    /// Test-day CSV the reference yields are estimated from.
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// Submission CSV (`TestObjectID`, `CalculatedMilkYield (kg)`).
    #[arg(short, long)]
    pub submission: PathBuf,

    /// Actual yields CSV (`TestId`, `TotalActualProduction`).
    #[arg(short, long)]
    pub actual: Option<PathBuf>,
}
