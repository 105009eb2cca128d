use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use modelverse_core::{CoreError, Result, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::tasks::{TaskContext, TaskJob, TaskOutcome};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskProgress {
    pub task_id: TaskId,
    pub task_name: String,
    pub progress: f64, // 0.0 to 1.0
    pub status: TaskStatus,
    pub message: Option<String>,
}

/// Publishes progress for one task onto the executor's broadcast channel.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    task_id: TaskId,
    task_name: String,
    tx: broadcast::Sender<TaskProgress>,
}

impl ProgressReporter {
    pub fn report(&self, progress: f64, status: TaskStatus, message: Option<String>) {
        // no subscribers is fine
        let _ = self.tx.send(TaskProgress {
            task_id: self.task_id,
            task_name: self.task_name.clone(),
            progress,
            status,
            message,
        });
    }

    /// Reporter whose updates go nowhere, for running a job inline.
    pub fn detached(task_id: TaskId) -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            task_id,
            task_name: String::new(),
            tx,
        }
    }
}

/// Awaitable handle to a spawned job. Dropping it detaches the job.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    cancel: CancellationToken,
    join: JoinHandle<TaskOutcome>,
}

impl TaskHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Result<TaskOutcome> {
        self.join
            .await
            .map_err(|e| CoreError::InvalidState(format!("task {} panicked: {e}", self.task_id)))
    }

    pub fn detach(self) {}

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Runs jobs on dedicated tokio tasks, one per task id, each with its own
/// cancellation token.
#[derive(Clone)]
pub struct TaskExecutor {
    progress_tx: broadcast::Sender<TaskProgress>,
    cancellation_tokens: Arc<DashMap<TaskId, CancellationToken>>,
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TaskExecutor {
    pub fn new(progress_capacity: usize) -> Self {
        let (progress_tx, _) = broadcast::channel(progress_capacity.max(1));
        Self {
            progress_tx,
            cancellation_tokens: Arc::new(DashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskProgress> {
        self.progress_tx.subscribe()
    }

    pub fn is_active(&self, task_id: &TaskId) -> bool {
        self.cancellation_tokens.contains_key(task_id)
    }

    pub fn active_tasks(&self) -> Vec<TaskId> {
        self.cancellation_tokens.iter().map(|entry| *entry.key()).collect()
    }

    /// Request cooperative cancellation. Returns `false` if nothing is
    /// running or cancellation was already requested.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        match self.cancellation_tokens.get(task_id) {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn cancel_all(&self) {
        for entry in self.cancellation_tokens.iter() {
            entry.value().cancel();
        }
    }

    pub fn spawn(&self, task_id: TaskId, job: Arc<dyn TaskJob>) -> Result<TaskHandle> {
        let cancel = CancellationToken::new();
        match self.cancellation_tokens.entry(task_id) {
            Entry::Occupied(_) => {
                return Err(CoreError::InvalidState(format!("task {task_id} is already running")));
            }
            Entry::Vacant(entry) => {
                entry.insert(cancel.clone());
            }
        }

        let reporter = ProgressReporter {
            task_id,
            task_name: job.name().to_string(),
            tx: self.progress_tx.clone(),
        };
        let context = TaskContext {
            task_id,
            cancel: cancel.clone(),
            progress: reporter.clone(),
        };
        let tokens = self.cancellation_tokens.clone();

        let join = tokio::spawn(async move {
            reporter.report(0.0, TaskStatus::Running, None);
            debug!(task_id = %task_id, job = job.name(), "job started");

            let outcome = match AssertUnwindSafe(job.execute(context)).catch_unwind().await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    warn!(task_id = %task_id, error = ?e, "job returned an error");
                    TaskOutcome::failed(e.to_string())
                }
                Err(_) => {
                    warn!(task_id = %task_id, "job panicked");
                    TaskOutcome::failed("job panicked")
                }
            };

            tokens.remove(&task_id);
            reporter.report(outcome.progress, outcome.status, outcome.error.clone());
            outcome
        });

        Ok(TaskHandle {
            task_id,
            cancel,
            join,
        })
    }
}
