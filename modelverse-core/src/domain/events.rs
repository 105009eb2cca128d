use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A structured per-task log line, as forwarded to the event transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEvent {
    pub task_id: TaskId,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub level: LogLevel,
}

impl LogEvent {
    pub fn new(task_id: TaskId, level: LogLevel, content: impl Into<String>) -> Self {
        Self {
            task_id,
            timestamp: Utc::now(),
            content: content.into(),
            level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_wire_format() {
        let event = LogEvent::new(TaskId::new(), LogLevel::Warning, "skipped sample");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["level"], "WARNING");
        assert_eq!(value["content"], "skipped sample");
        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }
}
