use modelverse_core::{
    ChatMessage, CoreError, DatasetProvider, GenerationBackend, GenerationResponse, LogEvent,
    ModelResolver, Result, SamplingOverrides, Task, TaskEventSink, TaskId, TaskKind, TaskStatus,
    TaskStore, TaskUpdate,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::executor::{TaskExecutor, TaskHandle, TaskProgress};
use crate::lifecycle::TaskLifecycle;
use crate::registry::{ProcessHandle, ProcessRegistry, TaskLocks};
use crate::supervisor::{ProcessSupervisor, ServiceStatus, SupervisorSettings};
use crate::tasks::{EvaluationRunner, EvaluationSettings};

/// A task that has been handed to its background worker.
#[derive(Debug)]
pub enum StartedTask {
    Inference(JoinHandle<Result<ProcessHandle>>),
    Evaluation(TaskHandle),
}

/// Collaborators the orchestrator is built from.
pub struct OrchestratorDeps {
    pub store: Arc<dyn TaskStore>,
    pub resolver: Arc<dyn ModelResolver>,
    pub datasets: Arc<dyn DatasetProvider>,
    pub backend: Arc<dyn GenerationBackend>,
    pub sink: Arc<dyn TaskEventSink>,
}

/// Entry point for starting, stopping and inspecting tasks of both kinds.
///
/// Inference tasks go to the [`ProcessSupervisor`]; evaluation tasks run on
/// the [`TaskExecutor`] through a shared [`EvaluationRunner`].
pub struct Orchestrator {
    lifecycle: TaskLifecycle,
    supervisor: Arc<ProcessSupervisor>,
    executor: TaskExecutor,
    evaluator: Arc<EvaluationRunner>,
}

impl Orchestrator {
    pub fn new(
        deps: OrchestratorDeps,
        supervisor_settings: SupervisorSettings,
        evaluation_settings: EvaluationSettings,
    ) -> Self {
        let lifecycle = TaskLifecycle::new(deps.store, Arc::new(TaskLocks::new()));
        let supervisor = ProcessSupervisor::new(
            lifecycle.clone(),
            Arc::new(ProcessRegistry::new()),
            deps.resolver.clone(),
            deps.sink.clone(),
            supervisor_settings,
        );
        let evaluator = EvaluationRunner::new(
            lifecycle.clone(),
            deps.resolver,
            deps.datasets,
            deps.backend,
            deps.sink,
            evaluation_settings,
        );

        Self {
            lifecycle,
            supervisor: Arc::new(supervisor),
            executor: TaskExecutor::default(),
            evaluator: Arc::new(evaluator),
        }
    }

    pub fn lifecycle(&self) -> &TaskLifecycle {
        &self.lifecycle
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskProgress> {
        self.executor.subscribe()
    }

    /// Validate and store a new task.
    pub async fn submit(&self, task: Task) -> Result<TaskId> {
        task.config.validate()?;
        let id = task.id;
        self.lifecycle.store().insert(task).await?;
        info!(task_id = %id, "task submitted");
        Ok(id)
    }

    pub async fn get(&self, task_id: &TaskId) -> Result<Task> {
        self.lifecycle.get(task_id).await
    }

    pub async fn logs(&self, task_id: &TaskId) -> Result<Vec<LogEvent>> {
        self.lifecycle.store().logs(task_id).await
    }

    // ===== Start / Stop =====

    /// Hand a pending task to its worker and return without waiting for it.
    pub async fn start_task(&self, task_id: TaskId) -> Result<StartedTask> {
        let task = self.lifecycle.get(&task_id).await?;
        if task.status != TaskStatus::Pending {
            return Err(CoreError::InvalidState(format!(
                "task {task_id} cannot start from status {}",
                task.status
            )));
        }

        match task.kind() {
            TaskKind::Inference => {
                let supervisor = self.supervisor.clone();
                Ok(StartedTask::Inference(tokio::spawn(async move {
                    supervisor.start(task_id).await
                })))
            }
            TaskKind::Evaluation => {
                let handle = self.executor.spawn(task_id, self.evaluator.clone())?;
                Ok(StartedTask::Evaluation(handle))
            }
        }
    }

    /// Stop a task. Returns `false` when nothing was running.
    pub async fn stop_task(&self, task_id: TaskId) -> Result<bool> {
        let task = self.lifecycle.get(&task_id).await?;
        match task.kind() {
            TaskKind::Inference => self.supervisor.stop(task_id).await,
            TaskKind::Evaluation => {
                if self.executor.is_active(&task_id) {
                    let requested = self.executor.cancel(&task_id);
                    if requested {
                        info!(task_id = %task_id, "evaluation cancellation requested");
                    }
                    return Ok(requested);
                }
                // running in the store but no worker: nothing will ever finish it
                if task.status.is_active() {
                    let stopped = self
                        .lifecycle
                        .apply(
                            task_id,
                            TaskUpdate::status(TaskStatus::Stopped)
                                .with_error("evaluation no longer running, marked as stopped"),
                        )
                        .await?;
                    return Ok(stopped.is_some());
                }
                Ok(false)
            }
        }
    }

    // ===== Queries =====

    /// Current task state, reconciled with process liveness for inference
    /// tasks.
    pub async fn status(&self, task_id: TaskId) -> Result<Task> {
        let task = self.lifecycle.get(&task_id).await?;
        match task.kind() {
            TaskKind::Inference => Ok(self.supervisor.status(task_id).await?.task),
            TaskKind::Evaluation => Ok(task),
        }
    }

    pub async fn service_status(&self, task_id: TaskId) -> Result<ServiceStatus> {
        self.supervisor.status(task_id).await
    }

    pub async fn generate(
        &self,
        task_id: TaskId,
        messages: Vec<ChatMessage>,
        overrides: SamplingOverrides,
    ) -> Result<GenerationResponse> {
        self.supervisor.generate(task_id, messages, overrides).await
    }

    // ===== Cleanup =====

    /// Remove the artifacts a finished task left on disk.
    pub async fn cleanup(&self, task_id: TaskId) -> Result<bool> {
        let task = self.lifecycle.get(&task_id).await?;
        match task.kind() {
            TaskKind::Inference => self.supervisor.cleanup(task_id).await,
            TaskKind::Evaluation => {
                if self.executor.is_active(&task_id) {
                    return Err(CoreError::InvalidState(format!(
                        "task {task_id} is still evaluating"
                    )));
                }
                let Some(run_dir) = task.result_path.as_deref().and_then(|path| path.parent()) else {
                    return Ok(false);
                };
                match tokio::fs::remove_dir_all(run_dir).await {
                    Ok(()) => Ok(true),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Cancel every evaluation and stop every serving process.
    pub async fn shutdown(&self) {
        let active = self.executor.active_tasks();
        if !active.is_empty() {
            warn!(count = active.len(), "cancelling running evaluations");
        }
        self.executor.cancel_all();
        self.supervisor.shutdown().await;
    }
}
