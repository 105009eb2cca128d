use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::config::{EvaluationConfig, InferenceConfig, TaskConfig};
use super::evaluation::Metrics;
use super::ids::TaskId;

// ===== Task Status =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Starting,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped
        )
    }

    /// Spawned or running, i.e. something may still need tearing down
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Starting | TaskStatus::Running)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Starting => 1,
            TaskStatus::Running => 2,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped => 3,
        }
    }

    /// Transitions only move forward, and nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Starting => "starting",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Inference,
    Evaluation,
}

// ===== Task =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub config: TaskConfig,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub api_base: Option<String>,
    pub error_message: Option<String>,
    pub result_path: Option<PathBuf>,
    pub metrics: Option<Metrics>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(name: impl Into<String>, config: TaskConfig) -> Self {
        let port = match &config {
            TaskConfig::Inference(inference) => inference.port,
            TaskConfig::Evaluation(_) => None,
        };
        Self {
            id: TaskId::new(),
            name: name.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            config,
            port,
            pid: None,
            api_base: None,
            error_message: None,
            result_path: None,
            metrics: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            stopped_at: None,
        }
    }

    pub fn inference(name: impl Into<String>, config: InferenceConfig) -> Self {
        Self::new(name, TaskConfig::Inference(config))
    }

    pub fn evaluation(name: impl Into<String>, config: EvaluationConfig) -> Self {
        Self::new(name, TaskConfig::Evaluation(config))
    }

    pub fn kind(&self) -> TaskKind {
        match self.config {
            TaskConfig::Inference(_) => TaskKind::Inference,
            TaskConfig::Evaluation(_) => TaskKind::Evaluation,
        }
    }

    pub fn inference_config(&self) -> Option<&InferenceConfig> {
        match &self.config {
            TaskConfig::Inference(config) => Some(config),
            TaskConfig::Evaluation(_) => None,
        }
    }

    pub fn evaluation_config(&self) -> Option<&EvaluationConfig> {
        match &self.config {
            TaskConfig::Evaluation(config) => Some(config),
            TaskConfig::Inference(_) => None,
        }
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        let end = self.completed_at.or(self.stopped_at)?;
        self.started_at.map(|start| (end - start).num_seconds())
    }

    /// Apply a partial update in place. Callers enforce transition rules.
    pub fn apply(&mut self, update: TaskUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(port) = update.port {
            self.port = Some(port);
        }
        if let Some(pid) = update.pid {
            self.pid = Some(pid);
        }
        if let Some(api_base) = update.api_base {
            self.api_base = Some(api_base);
        }
        if let Some(error_message) = update.error_message {
            self.error_message = Some(error_message);
        }
        if let Some(result_path) = update.result_path {
            self.result_path = Some(result_path);
        }
        if let Some(metrics) = update.metrics {
            self.metrics = Some(metrics);
        }
        if let Some(started_at) = update.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = Some(completed_at);
        }
        if let Some(stopped_at) = update.stopped_at {
            self.stopped_at = Some(stopped_at);
        }
    }
}

// ===== Partial Update =====

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub api_base: Option<String>,
    pub error_message: Option<String>,
    pub result_path: Option<PathBuf>,
    pub metrics: Option<Metrics>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(status: TaskStatus) -> Self {
        let now = Utc::now();
        let mut update = Self {
            status: Some(status),
            ..Self::default()
        };
        match status {
            TaskStatus::Starting | TaskStatus::Running => update.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed => update.completed_at = Some(now),
            TaskStatus::Stopped => update.stopped_at = Some(now),
            TaskStatus::Pending => {}
        }
        update
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::status(TaskStatus::Failed).with_error(message)
    }

    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    pub fn with_result_path(mut self, path: PathBuf) -> Self {
        self.result_path = Some(path);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
