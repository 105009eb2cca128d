//! `serve`: run one supervised serving process until interrupted

use anyhow::{bail, Context as _, Result};
use clap::Args;
use modelverse_core::{ChatMessage, InferenceConfig, SamplingOverrides, ServingLauncher, Task, TaskId};
use modelverse_workflow::{Orchestrator, StartedTask};
use std::time::Duration;

use super::default_served_name;
use crate::context::Context;
use crate::output::{print_field, print_section, print_task, OutputFormat};

const MONITOR_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Model id from the configuration, or a local model path
    pub model: String,

    /// Name the model is served under (defaults to the last path segment)
    #[arg(long)]
    pub name: Option<String>,

    /// Port to serve on (defaults to the first free port from the configured start)
    #[arg(short, long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub tensor_parallel_size: Option<u32>,

    #[arg(long)]
    pub max_model_len: Option<u32>,

    #[arg(long)]
    pub quantization: Option<String>,

    #[arg(long)]
    pub dtype: Option<String>,

    /// Launch this program instead of vLLM
    #[arg(long)]
    pub program: Option<String>,

    /// Argument for `--program`; `{port}`, `{model}` and `{name}` are substituted
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Send one prompt once the server is healthy
    #[arg(long)]
    pub prompt: Option<String>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,
}

impl ServeArgs {
    pub fn inference_config(&self) -> InferenceConfig {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| default_served_name(&self.model));
        let mut config = InferenceConfig::new(&self.model, name);

        config.port = self.port;
        if let Some(size) = self.tensor_parallel_size {
            config.tensor_parallel_size = size;
        }
        if let Some(len) = self.max_model_len {
            config.max_model_len = len;
        }
        if let Some(dtype) = &self.dtype {
            config.dtype = dtype.clone();
        }
        config.quantization = self.quantization.clone();
        if let Some(program) = &self.program {
            config.launcher = ServingLauncher::Custom {
                program: program.clone(),
                args: self.args.clone(),
            };
        }
        config
    }
}

pub async fn run(ctx: &Context, args: ServeArgs) -> Result<()> {
    let config = args.inference_config();
    let orchestrator = ctx.orchestrator(ctx.backend(None, config.request_timeout_secs)?)?;
    let task = Task::inference(format!("serve-{}", config.served_model_name), config);
    let id = orchestrator.submit(task).await?;

    let spinner = ctx.output.spinner(&format!("Starting serving process for {}", args.model))?;
    let StartedTask::Inference(join) = orchestrator.start_task(id).await? else {
        bail!("task {id} is not an inference task");
    };
    let started = join.await.context("startup worker panicked")?;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let handle = match started {
        Ok(handle) => handle,
        Err(e) => {
            if ctx.output.format() == OutputFormat::Table {
                print_task(&orchestrator.get(&id).await?);
            }
            return Err(e).context("serving process failed to start");
        }
    };

    match ctx.output.format() {
        OutputFormat::Table => {
            ctx.output.success(&format!("Serving on port {}", handle.port));
            print_task(&orchestrator.get(&id).await?);
            print_field("Log", &handle.log_path.display().to_string());
        }
        OutputFormat::Json => ctx.output.json(&handle)?,
    }

    if let Some(prompt) = &args.prompt {
        let overrides = SamplingOverrides {
            temperature: args.temperature,
            max_tokens: args.max_tokens,
            ..SamplingOverrides::default()
        };
        let response = orchestrator
            .generate(id, vec![ChatMessage::user(prompt.as_str())], overrides)
            .await?;
        match ctx.output.format() {
            OutputFormat::Table => {
                print_section("Response");
                println!("{}", response.content);
            }
            OutputFormat::Json => ctx.output.json(&response)?,
        }
    }

    ctx.output.info("Press Ctrl+C to stop");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            ctx.output.info("Stopping serving process");
        }
        _ = watch(&orchestrator, id) => {
            ctx.output.warning("Serving process is no longer running");
        }
    }

    orchestrator.shutdown().await;
    let task = orchestrator.get(&id).await?;
    match ctx.output.format() {
        OutputFormat::Table => print_task(&task),
        OutputFormat::Json => ctx.output.json(&task)?,
    }
    Ok(())
}

/// Resolves once the task leaves the running state.
async fn watch(orchestrator: &Orchestrator, id: TaskId) {
    loop {
        tokio::time::sleep(MONITOR_INTERVAL).await;
        match orchestrator.status(id).await {
            Ok(task) if task.status.is_running() => {}
            Ok(_) => return,
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "status check failed");
                return;
            }
        }
    }
}
