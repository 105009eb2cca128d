use modelverse_core::{CoreError, Result, Task, TaskId, TaskStatus, TaskStore, TaskUpdate};
use std::sync::Arc;
use tracing::debug;

use crate::registry::TaskLocks;

/// Applies task updates under the task's lock, enforcing that status only
/// moves forward and progress never decreases.
#[derive(Clone)]
pub struct TaskLifecycle {
    store: Arc<dyn TaskStore>,
    locks: Arc<TaskLocks>,
}

impl TaskLifecycle {
    pub fn new(store: Arc<dyn TaskStore>, locks: Arc<TaskLocks>) -> Self {
        Self { store, locks }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<TaskLocks> {
        &self.locks
    }

    pub async fn get(&self, id: &TaskId) -> Result<Task> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {id}")))
    }

    /// Apply `update` unless it would move a status backwards or touch a
    /// terminal task. Returns the stored task when the update was applied.
    pub async fn apply(&self, id: TaskId, update: TaskUpdate) -> Result<Option<Task>> {
        let _guard = self.locks.lock(id).await;
        self.apply_locked(id, update).await
    }

    /// Same as [`apply`](Self::apply) for callers already holding the lock.
    pub async fn apply_locked(&self, id: TaskId, mut update: TaskUpdate) -> Result<Option<Task>> {
        let current = self.get(&id).await?;

        if current.status.is_terminal() {
            debug!(task_id = %id, status = %current.status, "update ignored, task is terminal");
            return Ok(None);
        }
        if let Some(next) = update.status {
            if !current.status.can_transition_to(next) {
                debug!(task_id = %id, from = %current.status, to = %next, "transition rejected");
                return Ok(None);
            }
        }
        if matches!(update.progress, Some(progress) if progress < current.progress) {
            update.progress = None;
        }
        if update.is_empty() {
            return Ok(Some(current));
        }

        self.store.update(&id, update).await.map(Some)
    }

    pub async fn transition(&self, id: TaskId, status: TaskStatus) -> Result<Option<Task>> {
        self.apply(id, TaskUpdate::status(status)).await
    }

    pub async fn fail(&self, id: TaskId, message: impl Into<String>) -> Result<Option<Task>> {
        self.apply(id, TaskUpdate::failed(message)).await
    }

    pub async fn progress(&self, id: TaskId, progress: f64) -> Result<Option<Task>> {
        self.apply(id, TaskUpdate::progress(progress)).await
    }
}
