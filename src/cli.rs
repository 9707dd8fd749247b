//! Command-line options of the `insitu-stats` driver

use clap::Parser;
use std::path::PathBuf;

/// Replay a NetCDF snapshot through an in-situ stats session
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    name = "insitu-stats",
    about = "Compute configured field statistics over partitioned NetCDF data"
)]
pub struct Args {
    /// Path to the NetCDF file holding the input fields
    #[arg(short, long)]
    pub file: PathBuf,

    /// JSON session configuration (tracked fields, stats, inputs)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Number of in-process ranks the columns are distributed over
    #[arg(short, long, default_value_t = 1, value_parser = parse_positive)]
    pub ranks: usize,

    /// Number of partitions per rank along the column dimension
    #[arg(short, long, default_value_t = 1, value_parser = parse_positive)]
    pub parts: usize,

    /// Number of time steps to compute stats for
    #[arg(long, default_value_t = 1, value_parser = parse_positive)]
    pub steps: usize,

    /// Step length in seconds
    #[arg(long, default_value_t = 3600)]
    pub dt: u64,

    /// Start date as YYYYMMDD
    #[arg(long, default_value_t = 20000101)]
    pub ymd: i32,

    /// Start time of day in seconds
    #[arg(long, default_value_t = 0)]
    pub tod: i32,

    /// Write stat histories as NetCDF. With several ranks, each rank writes
    /// `<stem>.rank<N>.nc`. If not set, prints to terminal.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("value must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid number '{s}': {e}")),
    }
}
