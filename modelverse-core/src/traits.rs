use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::{
    BenchmarkKind, GenerationRequest, GenerationResponse, LogEvent, LogLevel, Subset, Task,
    TaskId, TaskUpdate,
};
use crate::error::Result;

/// Persisted task state. The source of truth for status; in-memory
/// registries are only liveness caches reconciled against it.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> Result<()>;
    async fn get(&self, id: &TaskId) -> Result<Option<Task>>;
    /// Apply a partial update and return the updated task.
    async fn update(&self, id: &TaskId, update: TaskUpdate) -> Result<Task>;
    async fn append_log(&self, id: &TaskId, text: &str, level: LogLevel) -> Result<()>;
    async fn logs(&self, id: &TaskId) -> Result<Vec<LogEvent>>;
}

/// Maps a model resource id to a local artifact path.
#[async_trait]
pub trait ModelResolver: Send + Sync {
    async fn resolve(&self, resource_id: &str) -> Result<Option<PathBuf>>;
}

#[async_trait]
pub trait DatasetProvider: Send + Sync {
    /// Named subsets for a benchmark. Order is not significant.
    async fn load(&self, benchmark: BenchmarkKind) -> Result<Vec<Subset>>;
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse>;
}

/// Synchronous, non-blocking sink for structured task log events.
pub trait TaskEventSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}
