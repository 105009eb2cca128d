use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{EvaluateArgs, ExtractArgs, MetricsArgs, ServeArgs};
use crate::output::OutputFormat;

/// Serve local models and run multiple-choice benchmark evaluations
#[derive(Debug, Parser)]
#[command(name = "modelverse", version, about, long_about = None)]
pub struct Cli {
    /// Directory holding `default.toml` and `local.toml`
    #[arg(long, global = true, env = "MODELVERSE_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Extra configuration file applied after the config directory
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Launch a serving process and keep it running until interrupted
    Serve(ServeArgs),

    /// Run a benchmark evaluation against a generation endpoint
    Evaluate(EvaluateArgs),

    /// Extract the chosen option letter from a model response
    Extract(ExtractArgs),

    /// Summarize a result artifact
    Metrics(MetricsArgs),
}
