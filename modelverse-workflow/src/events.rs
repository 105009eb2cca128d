use modelverse_core::{LogEvent, LogLevel, TaskEventSink, TaskId, TaskStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// ===== Sinks =====

/// Forwards task events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl TaskEventSink for TracingEventSink {
    fn emit(&self, event: LogEvent) {
        let task_id = event.task_id.to_string();
        match event.level {
            LogLevel::Debug => debug!(task_id, "{}", event.content),
            LogLevel::Info => info!(task_id, "{}", event.content),
            LogLevel::Warning => warn!(task_id, "{}", event.content),
            LogLevel::Error => error!(task_id, "{}", event.content),
        }
    }
}

/// Bounded queue in front of an external transport. `emit` never blocks;
/// when the queue is full the event is dropped and counted.
#[derive(Debug)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<LogEvent>,
    dropped: AtomicU64,
}

impl ChannelEventSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LogEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TaskEventSink for ChannelEventSink {
    fn emit(&self, event: LogEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Fans one event out to several sinks.
#[derive(Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn TaskEventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn TaskEventSink>>) -> Self {
        Self { sinks }
    }
}

impl TaskEventSink for FanoutEventSink {
    fn emit(&self, event: LogEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

// ===== Task Logger =====

/// Per-task log writer: every line goes to the event sink and is appended
/// to the task's persisted log.
#[derive(Clone)]
pub struct TaskLogger {
    task_id: TaskId,
    store: Arc<dyn TaskStore>,
    sink: Arc<dyn TaskEventSink>,
}

impl TaskLogger {
    pub fn new(task_id: TaskId, store: Arc<dyn TaskStore>, sink: Arc<dyn TaskEventSink>) -> Self {
        Self {
            task_id,
            store,
            sink,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub async fn log(&self, level: LogLevel, content: impl Into<String>) {
        let event = LogEvent::new(self.task_id, level, content);
        if let Err(e) = self
            .store
            .append_log(&self.task_id, &event.content, level)
            .await
        {
            warn!(task_id = %self.task_id, error = %e, "failed to persist task log");
        }
        self.sink.emit(event);
    }

    pub async fn debug(&self, content: impl Into<String>) {
        self.log(LogLevel::Debug, content).await
    }

    pub async fn info(&self, content: impl Into<String>) {
        self.log(LogLevel::Info, content).await
    }

    pub async fn warn(&self, content: impl Into<String>) {
        self.log(LogLevel::Warning, content).await
    }

    pub async fn error(&self, content: impl Into<String>) {
        self.log(LogLevel::Error, content).await
    }
}
