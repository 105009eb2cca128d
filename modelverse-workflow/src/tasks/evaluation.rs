use async_trait::async_trait;
use chrono::Utc;
use modelverse_core::{
    CoreError, DatasetProvider, EvaluationConfig, EvaluationResult, GenerationBackend,
    GenerationRequest, Metrics, ModelResolver, Result, Subset, SubjectResult, TaskEventSink,
    TaskId, TaskStatus, TaskUpdate,
};
use modelverse_metrics::{AccuracyCalculator, MetricsAggregator};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{prompt_messages, select_subjects, TaskContext, TaskJob, TaskOutcome};
use crate::adapters::resolve_existing;
use crate::events::TaskLogger;
use crate::lifecycle::TaskLifecycle;

pub const PARTIAL_RESULTS_FILE: &str = "partial_results.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluationSettings {
    pub results_dir: PathBuf,
    pub dataset_timeout_ms: u64,
    /// Consecutive sample errors that abort the rest of a subject
    pub max_consecutive_errors: usize,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            dataset_timeout_ms: 300_000,
            max_consecutive_errors: 5,
        }
    }
}

impl EvaluationSettings {
    pub fn dataset_timeout(&self) -> Duration {
        Duration::from_millis(self.dataset_timeout_ms)
    }
}

/// How a run ended when no top-level error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    Finished,
    Cancelled,
}

/// Mutable state of one run, kept outside the loop so a failure part-way
/// through still has everything needed for the partial artifact.
struct RunState {
    result: EvaluationResult,
    run_dir: PathBuf,
    progress: f64,
}

/// Runs multiple-choice benchmark evaluations for tasks in the store.
///
/// One runner is shared by every evaluation task; the task's own
/// [`EvaluationConfig`] is read from the store when the job starts.
pub struct EvaluationRunner {
    lifecycle: TaskLifecycle,
    resolver: Arc<dyn ModelResolver>,
    datasets: Arc<dyn DatasetProvider>,
    backend: Arc<dyn GenerationBackend>,
    sink: Arc<dyn TaskEventSink>,
    settings: EvaluationSettings,
}

impl EvaluationRunner {
    pub fn new(
        lifecycle: TaskLifecycle,
        resolver: Arc<dyn ModelResolver>,
        datasets: Arc<dyn DatasetProvider>,
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn TaskEventSink>,
        settings: EvaluationSettings,
    ) -> Self {
        Self {
            lifecycle,
            resolver,
            datasets,
            backend,
            sink,
            settings,
        }
    }

    pub fn settings(&self) -> &EvaluationSettings {
        &self.settings
    }

    fn logger(&self, task_id: TaskId) -> TaskLogger {
        TaskLogger::new(task_id, self.lifecycle.store().clone(), self.sink.clone())
    }

    /// Move a pending evaluation task to `Running` and return its config.
    async fn begin(&self, task_id: TaskId) -> Result<EvaluationConfig> {
        let _guard = self.lifecycle.locks().lock(task_id).await;
        let task = self.lifecycle.get(&task_id).await?;

        let config = task.evaluation_config().cloned().ok_or_else(|| {
            CoreError::InvalidState(format!("task {task_id} is not an evaluation task"))
        })?;
        if task.status != TaskStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "task {task_id} cannot start from status {}",
                task.status
            )));
        }
        task.config.validate()?;

        self.lifecycle
            .apply_locked(task_id, TaskUpdate::status(TaskStatus::Running).with_progress(0.0))
            .await?
            .ok_or_else(|| CoreError::InvalidState(format!("task {task_id} changed concurrently")))?;
        Ok(config)
    }

    // ===== Run Loop =====

    async fn run(
        &self,
        context: &TaskContext,
        config: &EvaluationConfig,
        logger: &TaskLogger,
        state: &mut RunState,
    ) -> Result<RunEnd> {
        let model_path = resolve_existing(self.resolver.as_ref(), &config.model_id).await?;
        logger
            .info(format!(
                "evaluating {} on {} ({})",
                config.model_id,
                config.benchmark.display_name(),
                model_path.display()
            ))
            .await;

        let subsets = self.load_subsets(config).await?;
        let selected = select_subjects(subsets, config);
        let names: Vec<&str> = selected.iter().map(|s| s.name.as_str()).collect();
        logger
            .info(format!("selected {} subjects: {}", selected.len(), names.join(", ")))
            .await;

        let calculator = AccuracyCalculator::for_benchmark(config.benchmark);
        let total_subjects = selected.len();

        for (index, subset) in selected.iter().enumerate() {
            if context.is_cancelled() {
                return Ok(RunEnd::Cancelled);
            }

            let mut subject = SubjectResult::new(subset.name.clone());
            let outcome = self
                .evaluate_subject(
                    context,
                    config,
                    &calculator,
                    subset,
                    index,
                    total_subjects,
                    logger,
                    &mut subject,
                    state,
                )
                .await;

            logger
                .info(format!(
                    "subject {}: {}/{} correct, accuracy {:.4}",
                    subject.subject,
                    subject.correct,
                    subject.total,
                    subject.accuracy()
                ))
                .await;
            state.result.push(subject);

            match outcome {
                Ok(RunEnd::Finished) => {}
                Ok(RunEnd::Cancelled) => return Ok(RunEnd::Cancelled),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    logger.error(format!("{e:?}")).await;
                    warn!(task_id = %context.task_id, subject = %subset.name, error = %e, "subject failed, continuing");
                }
            }

            self.report_progress(context, state, (index + 1) as f64 / total_subjects as f64)
                .await?;
        }

        Ok(RunEnd::Finished)
    }

    async fn load_subsets(&self, config: &EvaluationConfig) -> Result<Vec<Subset>> {
        let limit = self.settings.dataset_timeout();
        let subsets = timeout(limit, self.datasets.load(config.benchmark))
            .await
            .map_err(|_| {
                CoreError::ResourceUnavailable(format!(
                    "{} data not loaded within {limit:?}",
                    config.benchmark.display_name()
                ))
            })??;

        if subsets.iter().all(|subset| subset.is_empty()) {
            return Err(CoreError::ResourceUnavailable(format!(
                "no {} data available",
                config.benchmark.display_name()
            )));
        }
        Ok(subsets)
    }

    /// Evaluate one subject into `subject`. Answers recorded before an error
    /// stay in `subject`.
    #[allow(clippy::too_many_arguments)]
    async fn evaluate_subject(
        &self,
        context: &TaskContext,
        config: &EvaluationConfig,
        calculator: &AccuracyCalculator,
        subset: &Subset,
        index: usize,
        total_subjects: usize,
        logger: &TaskLogger,
        subject: &mut SubjectResult,
        state: &mut RunState,
    ) -> Result<RunEnd> {
        let letters = calculator.letters();
        let in_subject = subset.len();
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let mut consecutive_errors = 0usize;

        logger
            .info(format!("evaluating subject {} ({in_subject} samples)", subset.name))
            .await;

        for (position, sample) in subset.samples.iter().enumerate() {
            if context.is_cancelled() {
                return Ok(RunEnd::Cancelled);
            }

            match sample.validate(letters) {
                Err(reason) => {
                    logger
                        .warn(format!("skipping sample {} of {}: {reason}", position + 1, subset.name))
                        .await;
                }
                Ok(()) => {
                    let request = GenerationRequest::new(
                        config.served_model_name.clone(),
                        prompt_messages(sample, letters),
                        config.sampling,
                    );
                    let started = Instant::now();
                    let response = match timeout(request_timeout, self.backend.generate(request)).await {
                        Ok(response) => response,
                        Err(_) => Err(CoreError::TransientSample(format!(
                            "no response within {request_timeout:?}"
                        ))),
                    };
                    let latency_secs = started.elapsed().as_secs_f64();

                    match response {
                        Ok(response) => {
                            consecutive_errors = 0;
                            if let Some(answer) = calculator.answer(sample, response.content, latency_secs) {
                                debug!(
                                    task_id = %context.task_id,
                                    subject = %subset.name,
                                    choice = %answer.extracted_choice,
                                    correct = answer.is_correct,
                                    "sample scored"
                                );
                                subject.record(answer);
                            }
                        }
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            consecutive_errors += 1;
                            state.result.sample_errors += 1;
                            logger
                                .warn(format!(
                                    "sample {} of {} failed: {e}",
                                    position + 1,
                                    subset.name
                                ))
                                .await;
                            if consecutive_errors >= self.settings.max_consecutive_errors {
                                return Err(CoreError::SubjectFailure(format!(
                                    "{}: {consecutive_errors} consecutive sample errors, skipping the rest of the subject",
                                    subset.name
                                )));
                            }
                        }
                    }
                }
            }

            let done = (position + 1) as f64 / in_subject as f64;
            let progress = (index as f64 + done) / total_subjects as f64;
            self.report_progress(context, state, progress).await?;
        }

        Ok(RunEnd::Finished)
    }

    async fn report_progress(&self, context: &TaskContext, state: &mut RunState, progress: f64) -> Result<()> {
        if progress <= state.progress {
            return Ok(());
        }
        state.progress = progress;
        self.lifecycle.progress(context.task_id, progress).await?;
        context.progress.report(progress, TaskStatus::Running, None);
        Ok(())
    }

    // ===== Completion =====

    async fn write_artifact(&self, state: &RunState, file_name: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&state.run_dir).await?;
        let path = state.run_dir.join(file_name);
        let body = serde_json::to_string_pretty(&state.result.to_artifact())?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }

    /// Write the artifact and read it back through the aggregator.
    async fn persist_results(&self, state: &RunState) -> Result<(PathBuf, Metrics)> {
        let file_name = format!("{}_results.json", state.result.benchmark.as_str());
        let path = self.write_artifact(state, &file_name).await?;
        let metrics = MetricsAggregator::parse(&path).await;
        Ok((path, metrics))
    }

    async fn finish(
        &self,
        task_id: TaskId,
        state: &RunState,
        end: RunEnd,
        logger: &TaskLogger,
    ) -> Result<TaskOutcome> {
        let (path, metrics) = self.persist_results(state).await?;
        let (update, outcome) = match end {
            RunEnd::Finished => (
                TaskUpdate::status(TaskStatus::Completed).with_progress(1.0),
                TaskOutcome::completed(Some(path.clone())),
            ),
            RunEnd::Cancelled => (
                TaskUpdate::status(TaskStatus::Stopped),
                TaskOutcome::stopped(state.progress, Some(path.clone())),
            ),
        };

        if self
            .lifecycle
            .apply(task_id, update.with_result_path(path.clone()).with_metrics(metrics))
            .await?
            .is_none()
        {
            warn!(task_id = %task_id, "task changed state before results were recorded");
        }

        logger
            .info(format!(
                "evaluation {}: overall accuracy {:.4}, average accuracy {:.4}, results at {}",
                if end == RunEnd::Finished { "completed" } else { "stopped" },
                state.result.micro_accuracy(),
                state.result.macro_accuracy(),
                path.display()
            ))
            .await;
        info!(task_id = %task_id, status = %outcome.status, "evaluation finished");
        Ok(outcome)
    }

    async fn fail(&self, task_id: TaskId, state: &RunState, logger: &TaskLogger, err: CoreError) -> TaskOutcome {
        logger.error(format!("{err:?}")).await;

        let mut update = TaskUpdate::failed(err.to_string());
        let mut outcome = TaskOutcome::failed(err.to_string());
        outcome.progress = state.progress;

        if !state.result.subjects.is_empty() {
            match self.write_artifact(state, PARTIAL_RESULTS_FILE).await {
                Ok(path) => {
                    logger.info(format!("partial results saved to {}", path.display())).await;
                    update = update.with_result_path(path.clone());
                    outcome = outcome.with_result_path(path);
                }
                Err(e) => warn!(task_id = %task_id, error = %e, "could not write partial results"),
            }
        }

        if let Err(e) = self.lifecycle.apply(task_id, update).await {
            warn!(task_id = %task_id, error = %e, "could not record failure");
        }
        outcome
    }

    fn run_dir(&self, task_id: TaskId) -> PathBuf {
        run_dir(&self.settings.results_dir, task_id)
    }
}

/// `<results_dir>/task_<short id>_<unix seconds>`
pub fn run_dir(results_dir: &Path, task_id: TaskId) -> PathBuf {
    results_dir.join(format!("task_{}_{}", task_id.short(), Utc::now().timestamp()))
}

#[async_trait]
impl TaskJob for EvaluationRunner {
    async fn execute(&self, context: TaskContext) -> Result<TaskOutcome> {
        let task_id = context.task_id;
        let logger = self.logger(task_id);
        let config = self.begin(task_id).await?;

        let mut state = RunState {
            result: EvaluationResult::new(config.benchmark),
            run_dir: self.run_dir(task_id),
            progress: 0.0,
        };

        let outcome = match self.run(&context, &config, &logger, &mut state).await {
            Ok(end) => self.finish(task_id, &state, end, &logger).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(e) => Ok(self.fail(task_id, &state, &logger, e).await),
        }
    }

    fn name(&self) -> &str {
        "evaluation"
    }
}
