use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a single workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(format!("exec_{}", Uuid::new_v4()))
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a run. `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
    Stopped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Category of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Info,
    Error,
    Success,
    Warning,
    NodeStart,
    NodeComplete,
    UserInput,
    Database,
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Error => "error",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::NodeStart => "node_start",
            Self::NodeComplete => "node_complete",
            Self::UserInput => "user_input",
            Self::Database => "database",
        };
        write!(f, "{}", s)
    }
}

/// A single entry in a run's execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub node_name: String,
    pub kind: LogKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(
        kind: LogKind,
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            node_id: node_id.into(),
            node_name: node_name.into(),
            kind,
            message: message.into(),
            input: None,
            output: None,
        }
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }
}

/// The record of one workflow run.
///
/// Created in `Running` state when the run starts; the log is append-only
/// and insertion-ordered. A new run replaces the record wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub log: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
}

impl ExecutionRecord {
    pub fn new(user_input: Option<String>) -> Self {
        Self {
            id: ExecutionId::new(),
            status: RunStatus::Running,
            current_node_id: None,
            start_time: Utc::now(),
            end_time: None,
            log: vec![],
            user_input,
        }
    }

    /// Duration of the run, if it has finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_kind_serde_names() {
        let json = serde_json::to_string(&LogKind::NodeStart).unwrap();
        assert_eq!(json, "\"node_start\"");
        let parsed: LogKind = serde_json::from_str("\"user_input\"").unwrap();
        assert_eq!(parsed, LogKind::UserInput);
    }

    #[test]
    fn test_log_entry_optional_payloads() {
        let entry = LogEntry::new(LogKind::Info, "SYSTEM", "System", "starting");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("\"input\""));
        assert!(!json.contains("\"output\""));

        let entry = entry.with_output(serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"output\""));
    }

    #[test]
    fn test_fresh_record_is_running() {
        let record = ExecutionRecord::new(Some("hello".into()));
        assert_eq!(record.status, RunStatus::Running);
        assert!(record.end_time.is_none());
        assert!(record.log.is_empty());
        assert_eq!(record.user_input.as_deref(), Some("hello"));
        assert!(record.id.0.starts_with("exec_"));
    }
}
