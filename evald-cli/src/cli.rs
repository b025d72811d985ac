//! Command line interface definition

use clap::Parser;
use std::path::PathBuf;

/// Evaluator-side runtime: executes contexts and tasks on behalf of a
/// remote driver and reports status over the stdio channel.
#[derive(Parser, Debug)]
#[command(name = "evald", version)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Evaluator identity, overriding configuration and environment
    #[arg(long)]
    pub evaluator_id: Option<String>,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,
}
