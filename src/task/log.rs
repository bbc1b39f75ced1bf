//! Per-task log.
//!
//! Every task keeps its most recent entries in memory (newest first, fixed
//! capacity) for snapshots and UI, and appends every entry to an unbounded
//! durable store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;

/// Maximum number of entries held in memory per task.
pub const TASK_LOG_CAPACITY: usize = 200;

/// Severity of a task log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A single task log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub message: String,
    #[serde(rename = "type")]
    pub severity: Severity,
}

/// Fixed-capacity task log, newest entry first.
#[derive(Debug, Clone)]
pub struct TaskLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl TaskLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild from persisted entries (already newest first).
    #[must_use]
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        let mut log = Self::default();
        log.entries = entries.into_iter().take(log.capacity).collect();
        log
    }

    /// Insert at the front, evicting the oldest entry when full.
    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(entry);
    }

    /// The newest `limit` entries.
    #[must_use]
    pub fn newest(&self, limit: usize) -> Vec<LogEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TaskLog {
    fn default() -> Self {
        Self::new(TASK_LOG_CAPACITY)
    }
}

/// Durable append-only log sink, one stream per task.
pub trait TaskLogStore: Send + Sync {
    fn append(&self, task_id: &str, entry: &LogEntry) -> crate::Result<()>;
}

/// Appends entries as text lines to `<dir>/task_<id>.log`.
#[derive(Debug, Clone)]
pub struct FileLogStore {
    dir: PathBuf,
}

impl FileLogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("task_{task_id}.log"))
    }
}

impl TaskLogStore for FileLogStore {
    fn append(&self, task_id: &str, entry: &LogEntry) -> crate::Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            crate::LoopError::Persistence(format!("cannot create log dir: {e}"))
        })?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(task_id))
            .map_err(|e| crate::LoopError::Persistence(format!("cannot open task log: {e}")))?;
        writeln!(
            file,
            "[{}] [{}] {}",
            entry.time.to_rfc3339(),
            entry.severity.as_str().to_ascii_uppercase(),
            entry.message
        )
        .map_err(|e| crate::LoopError::Persistence(format!("cannot append task log: {e}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            time: Utc::now(),
            message: message.to_owned(),
            severity: Severity::Info,
        }
    }

    #[test]
    fn newest_entry_comes_first() {
        let mut log = TaskLog::new(10);
        log.push(entry("first"));
        log.push(entry("second"));
        let newest = log.newest(10);
        assert_eq!(newest[0].message, "second");
        assert_eq!(newest[1].message, "first");
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut log = TaskLog::default();
        for i in 0..(TASK_LOG_CAPACITY + 25) {
            log.push(entry(&format!("m{i}")));
        }
        assert_eq!(log.len(), TASK_LOG_CAPACITY);
        let newest = log.newest(TASK_LOG_CAPACITY);
        assert_eq!(newest[0].message, format!("m{}", TASK_LOG_CAPACITY + 24));
        assert_eq!(newest[TASK_LOG_CAPACITY - 1].message, "m25");
    }

    #[test]
    fn severity_serializes_as_type_field() {
        let json = serde_json::to_value(LogEntry {
            time: Utc::now(),
            message: "sent".to_owned(),
            severity: Severity::Success,
        })
        .unwrap();
        assert_eq!(json["type"], "success");
        assert_eq!(json["message"], "sent");
    }

    #[test]
    fn file_store_appends_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileLogStore::new(dir.path().join("logs"));
        store.append("t1", &entry("one")).expect("append");
        store.append("t1", &entry("two")).expect("append");

        let content = std::fs::read_to_string(store.path_for("t1")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[INFO] one"));
        assert!(lines[1].ends_with("[INFO] two"));
    }
}
