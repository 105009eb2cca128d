use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod config;
mod context;
mod output;

use cli::{Cli, Commands};
use config::{AppConfig, LogFormat, LoggingConfig};
use context::Context;
use output::OutputWriter;

fn init_tracing(logging: &LoggingConfig, verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("modelverse=debug")
        } else {
            EnvFilter::new(&logging.level)
        }
    });

    // Logs go to stderr so JSON command output stays parseable.
    let registry = tracing_subscriber::registry().with(filter);
    if json || logging.format == LogFormat::Json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let output = OutputWriter::new(cli.output, cli.no_color);

    if let Err(e) = run(cli, &output).await {
        output.error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    let config = AppConfig::load(&cli.config_dir, cli.config.as_deref())?;
    init_tracing(&config.logging, cli.verbose, cli.log_json);
    tracing::debug!(config_dir = %cli.config_dir.display(), "configuration loaded");

    let ctx = Context::new(config, OutputWriter::new(output.format(), cli.no_color));
    match cli.command {
        Commands::Serve(args) => commands::serve::run(&ctx, args).await,
        Commands::Evaluate(args) => commands::evaluate::run(&ctx, args).await,
        Commands::Extract(args) => commands::extract::run(&ctx, args),
        Commands::Metrics(args) => commands::metrics::run(&ctx, args).await,
    }
}
