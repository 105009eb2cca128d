use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use modelverse_core::{CoreError, LogEvent, LogLevel, Result, Task, TaskId, TaskStore, TaskUpdate};

/// Task store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<TaskId, Task>,
    logs: DashMap<TaskId, Vec<LogEvent>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<()> {
        match self.tasks.entry(task.id) {
            Entry::Occupied(entry) => Err(CoreError::InvalidState(format!(
                "task {} already exists",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(task);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.get(id).map(|task| task.clone()))
    }

    async fn update(&self, id: &TaskId, update: TaskUpdate) -> Result<Task> {
        let mut task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(format!("task {id}")))?;
        task.apply(update);
        Ok(task.clone())
    }

    async fn append_log(&self, id: &TaskId, text: &str, level: LogLevel) -> Result<()> {
        self.logs
            .entry(*id)
            .or_default()
            .push(LogEvent::new(*id, level, text));
        Ok(())
    }

    async fn logs(&self, id: &TaskId) -> Result<Vec<LogEvent>> {
        Ok(self.logs.get(id).map(|logs| logs.clone()).unwrap_or_default())
    }
}
