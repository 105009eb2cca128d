//! `metrics`: summarize a result artifact written by an evaluation

use anyhow::{bail, Result};
use clap::Args;
use modelverse_metrics::MetricsAggregator;
use std::path::PathBuf;

use crate::context::Context;
use crate::output::{metrics_table, OutputFormat};

#[derive(Debug, Args)]
pub struct MetricsArgs {
    /// Path to a `*_results.json` artifact
    pub path: PathBuf,
}

pub async fn run(ctx: &Context, args: MetricsArgs) -> Result<()> {
    if !args.path.is_file() {
        bail!("{} is not a file", args.path.display());
    }

    let metrics = MetricsAggregator::parse(&args.path).await;
    if metrics.is_empty() {
        ctx.output
            .warning(&format!("No metrics found in {}", args.path.display()));
    }

    match ctx.output.format() {
        OutputFormat::Json => ctx.output.json(&metrics)?,
        OutputFormat::Table => println!("{}", metrics_table(&metrics)),
    }
    Ok(())
}
