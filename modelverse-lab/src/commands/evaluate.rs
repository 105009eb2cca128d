//! `evaluate`: run one benchmark evaluation with live progress

use anyhow::{anyhow, bail, Context as _, Result};
use clap::Args;
use modelverse_core::{BenchmarkKind, EvaluationConfig, ResultArtifact, Task, TaskStatus};
use modelverse_workflow::StartedTask;
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;

use super::default_served_name;
use crate::context::Context;
use crate::output::{metrics_table, print_section, print_task, progress_position, results_table, OutputFormat};

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    /// Model id from the configuration, or a local model path
    pub model: String,

    /// Model name sent to the generation endpoint (defaults to the last path segment)
    #[arg(long)]
    pub name: Option<String>,

    /// Benchmark to run (mmlu, mmlu-pro)
    #[arg(short, long, default_value = "mmlu")]
    pub benchmark: BenchmarkKind,

    /// Generation endpoint, overriding `evaluation.api_base`
    #[arg(long)]
    pub api_base: Option<String>,

    #[arg(long)]
    pub max_subjects: Option<usize>,

    #[arg(long)]
    pub min_samples: Option<usize>,

    #[arg(long)]
    pub max_samples: Option<usize>,

    /// Fraction of each subject to sample, before the min/max bounds
    #[arg(long)]
    pub sample_fraction: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub max_tokens: Option<u32>,
}

impl EvaluateArgs {
    pub fn evaluation_config(&self, default_seed: u64, request_timeout_secs: u64) -> EvaluationConfig {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| default_served_name(&self.model));
        let mut config = EvaluationConfig::new(&self.model, name, self.benchmark);

        config.seed = self.seed.unwrap_or(default_seed);
        config.request_timeout_secs = request_timeout_secs;
        if let Some(max_subjects) = self.max_subjects {
            config.max_subjects = max_subjects;
        }
        if let Some(min_samples) = self.min_samples {
            config.min_samples = min_samples;
        }
        if let Some(max_samples) = self.max_samples {
            config.max_samples = max_samples;
        }
        if let Some(fraction) = self.sample_fraction {
            config.sample_fraction = fraction;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.sampling.max_tokens = max_tokens;
        }
        config
    }
}

pub async fn run(ctx: &Context, args: EvaluateArgs) -> Result<()> {
    let section = &ctx.config.evaluation;
    let config = args.evaluation_config(section.seed, section.request_timeout_secs);
    let backend = ctx.backend(args.api_base.as_deref(), config.request_timeout_secs)?;
    let orchestrator = ctx.orchestrator(backend)?;

    let task = Task::evaluation(
        format!("{}-{}", config.benchmark, config.served_model_name),
        config,
    );
    let id = orchestrator.submit(task).await?;
    let mut progress = orchestrator.subscribe();

    let StartedTask::Evaluation(handle) = orchestrator.start_task(id).await? else {
        bail!("task {id} is not an evaluation task");
    };
    let bar = ctx.output.progress_bar(&format!(
        "{} on {}",
        args.model,
        args.benchmark.display_name()
    ))?;

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut stopping = false;
    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome?,
            update = progress.recv() => match update {
                Ok(update) if update.task_id == id => {
                    if let Some(bar) = &bar {
                        bar.set_position(progress_position(update.progress));
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break (&mut wait).await?,
            },
            signal = tokio::signal::ctrl_c(), if !stopping => {
                signal.context("failed to listen for Ctrl+C")?;
                stopping = true;
                ctx.output.warning("Stopping after the current sample");
                orchestrator.stop_task(id).await?;
            }
        }
    };
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let task = orchestrator.get(&id).await?;
    match ctx.output.format() {
        OutputFormat::Json => ctx.output.json(&task)?,
        OutputFormat::Table => {
            print_task(&task);
            if let Some(path) = &task.result_path {
                match read_artifact(path).await {
                    Ok(artifact) => {
                        print_section(&format!("{} results", args.benchmark.display_name()));
                        println!("{}", results_table(&artifact));
                    }
                    Err(e) => ctx.output.warning(&format!("{e:#}")),
                }
            }
            if let Some(metrics) = &task.metrics {
                print_section("Metrics");
                println!("{}", metrics_table(metrics));
            }
        }
    }

    match outcome.status {
        TaskStatus::Completed => {
            ctx.output.success("Evaluation completed");
            Ok(())
        }
        TaskStatus::Stopped => {
            ctx.output.warning("Evaluation stopped; partial results were saved");
            Ok(())
        }
        _ => Err(anyhow!(
            "evaluation failed: {}",
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        )),
    }
}

async fn read_artifact(path: &Path) -> Result<ResultArtifact> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("cannot parse {}", path.display()))
}
