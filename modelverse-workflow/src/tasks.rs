pub mod evaluation;
pub mod prompt;
pub mod selection;

pub use evaluation::*;
pub use prompt::*;
pub use selection::*;

use async_trait::async_trait;
use modelverse_core::{Result, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::executor::ProgressReporter;

#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub cancel: CancellationToken,
    pub progress: ProgressReporter,
}

impl TaskContext {
    /// Context for running a job inline, outside the executor.
    pub fn detached(task_id: TaskId) -> Self {
        Self {
            task_id,
            cancel: CancellationToken::new(),
            progress: ProgressReporter::detached(task_id),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A unit of background work run by the executor.
#[async_trait]
pub trait TaskJob: Send + Sync {
    async fn execute(&self, context: TaskContext) -> Result<TaskOutcome>;
    fn name(&self) -> &str;
}

/// Final state of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub progress: f64,
    pub result_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn completed(result_path: Option<PathBuf>) -> Self {
        Self {
            status: TaskStatus::Completed,
            progress: 1.0,
            result_path,
            error: None,
        }
    }

    pub fn stopped(progress: f64, result_path: Option<PathBuf>) -> Self {
        Self {
            status: TaskStatus::Stopped,
            progress,
            result_path,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            progress: 0.0,
            result_path: None,
            error: Some(error.into()),
        }
    }

    pub fn with_result_path(mut self, path: PathBuf) -> Self {
        self.result_path = Some(path);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}
